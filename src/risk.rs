// =============================================================================
// Risk Integrator — position size and stop distance from the adjusted score
// =============================================================================
//
//   strength       = |adjusted - 50| / 50                       ∈ [0, 1]
//   size_fraction  = max_position_fraction * strength           (monotonic)
//   stop_mult      = min_mult + (max_mult - min_mult) * strength
//   stop_distance  = side_stop_pct(side) * stop_mult            (percent)
//
// Both functions take the adjusted score and the side only. An optional
// overlay may then shrink the size and tighten the stop from quality metrics
// (confidence / disagreement); it can never enlarge either, and the stop
// multiplier never drops below `min_stop_multiplier`.
// =============================================================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runtime_config::RiskConfiguration;
use crate::scoring::AdjustedScore;
use crate::types::{Decision, Side};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Risk parameters for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParameters {
    /// `None` for a NEUTRAL decision.
    pub side: Option<Side>,
    /// Fraction of capital, in `[0, max_position_fraction]`.
    pub position_size_fraction: f64,
    /// Stop distance as a percentage of entry price.
    pub stop_loss_distance_pct: f64,
    pub stop_multiplier: f64,
    /// Name of the overlay that changed the parameters, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<String>,
}

impl RiskParameters {
    /// No position.
    pub fn flat() -> Self {
        Self {
            side: None,
            position_size_fraction: 0.0,
            stop_loss_distance_pct: 0.0,
            stop_multiplier: 0.0,
            overlay: None,
        }
    }
}

/// Quality metrics an overlay may key on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityContext {
    pub confidence: f64,
    pub consensus: f64,
    pub disagreement: f64,
}

/// Scale factors an overlay asks for. Values are clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayAdjustment {
    pub size_scale: f64,
    pub stop_scale: f64,
}

/// Advisory risk policy applied on top of the base sizing formulas.
pub trait RiskOverlay: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return `Some` to shrink size and/or tighten the stop.
    fn adjust(&self, quality: &QualityContext) -> Option<OverlayAdjustment>;
}

/// Overlay that never changes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverlay;

impl RiskOverlay for NoOverlay {
    fn name(&self) -> &'static str {
        "none"
    }

    fn adjust(&self, _quality: &QualityContext) -> Option<OverlayAdjustment> {
        None
    }
}

/// Shrinks size and tightens stops when confidence is low or disagreement is
/// high.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityHaircut {
    pub min_confidence: f64,
    pub max_disagreement: f64,
    pub size_scale: f64,
    pub stop_scale: f64,
}

impl From<&RiskConfiguration> for QualityHaircut {
    fn from(cfg: &RiskConfiguration) -> Self {
        Self {
            min_confidence: cfg.haircut_min_confidence,
            max_disagreement: cfg.haircut_max_disagreement,
            size_scale: cfg.haircut_size_scale,
            stop_scale: cfg.haircut_stop_scale,
        }
    }
}

impl RiskOverlay for QualityHaircut {
    fn name(&self) -> &'static str {
        "quality_haircut"
    }

    fn adjust(&self, quality: &QualityContext) -> Option<OverlayAdjustment> {
        if quality.confidence < self.min_confidence || quality.disagreement > self.max_disagreement {
            Some(OverlayAdjustment {
                size_scale: self.size_scale,
                stop_scale: self.stop_scale,
            })
        } else {
            None
        }
    }
}

/// Overlay selected by configuration.
pub fn overlay_from_config(cfg: &RiskConfiguration) -> Arc<dyn RiskOverlay> {
    if cfg.enable_quality_haircut {
        Arc::new(QualityHaircut::from(cfg))
    } else {
        Arc::new(NoOverlay)
    }
}

// ---------------------------------------------------------------------------
// Risk Integrator
// ---------------------------------------------------------------------------

pub struct RiskIntegrator {
    max_position_fraction: f64,
    min_stop_multiplier: f64,
    max_stop_multiplier: f64,
    long_stop_pct: f64,
    short_stop_pct: f64,
    overlay: Arc<dyn RiskOverlay>,
}

impl RiskIntegrator {
    pub fn new(cfg: &RiskConfiguration) -> Self {
        Self {
            max_position_fraction: cfg.max_position_fraction,
            min_stop_multiplier: cfg.min_stop_multiplier,
            max_stop_multiplier: cfg.max_stop_multiplier,
            long_stop_pct: cfg.long_stop_pct,
            short_stop_pct: cfg.short_stop_pct,
            overlay: overlay_from_config(cfg),
        }
    }

    /// Replace the overlay chosen from configuration.
    pub fn with_overlay(mut self, overlay: Arc<dyn RiskOverlay>) -> Self {
        self.overlay = overlay;
        self
    }

    /// Fraction of capital for a position, monotonic in signal strength.
    pub fn position_size_fraction(&self, score: AdjustedScore, _side: Side) -> f64 {
        (self.max_position_fraction * score.strength()).clamp(0.0, self.max_position_fraction)
    }

    /// Stop multiplier, widening with signal strength between the configured
    /// bounds.
    pub fn stop_multiplier(&self, score: AdjustedScore) -> f64 {
        let span = self.max_stop_multiplier - self.min_stop_multiplier;
        (self.min_stop_multiplier + span * score.strength())
            .clamp(self.min_stop_multiplier, self.max_stop_multiplier)
    }

    /// Stop distance in percent of entry price.
    pub fn stop_loss_distance(&self, score: AdjustedScore, side: Side) -> f64 {
        self.side_stop_pct(side) * self.stop_multiplier(score)
    }

    fn side_stop_pct(&self, side: Side) -> f64 {
        match side {
            Side::Long => self.long_stop_pct,
            Side::Short => self.short_stop_pct,
        }
    }

    /// Full risk parameters for a decision. NEUTRAL yields [`RiskParameters::flat`].
    pub fn parameters(
        &self,
        score: AdjustedScore,
        decision: Decision,
        quality: Option<&QualityContext>,
    ) -> RiskParameters {
        let Some(side) = decision.side() else {
            return RiskParameters::flat();
        };

        let mut size = self.position_size_fraction(score, side);
        let mut multiplier = self.stop_multiplier(score);
        let mut overlay = None;

        if let Some(adj) = quality.and_then(|q| self.overlay.adjust(q)) {
            let size_scale = adj.size_scale.clamp(0.0, 1.0);
            let stop_scale = adj.stop_scale.clamp(0.0, 1.0);
            size *= size_scale;
            multiplier = (multiplier * stop_scale).max(self.min_stop_multiplier);
            overlay = Some(self.overlay.name().to_string());
            debug!(
                overlay = self.overlay.name(),
                size_scale,
                stop_scale,
                "risk overlay applied"
            );
        }

        RiskParameters {
            side: Some(side),
            position_size_fraction: size,
            stop_loss_distance_pct: self.side_stop_pct(side) * multiplier,
            stop_multiplier: multiplier,
            overlay,
        }
    }
}

impl std::fmt::Debug for RiskIntegrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskIntegrator")
            .field("max_position_fraction", &self.max_position_fraction)
            .field("min_stop_multiplier", &self.min_stop_multiplier)
            .field("max_stop_multiplier", &self.max_stop_multiplier)
            .field("long_stop_pct", &self.long_stop_pct)
            .field("short_stop_pct", &self.short_stop_pct)
            .field("overlay", &self.overlay.name())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn integrator() -> RiskIntegrator {
        RiskIntegrator::new(&RiskConfiguration::default())
    }

    fn s(v: f64) -> AdjustedScore {
        AdjustedScore::new(v)
    }

    #[test]
    fn size_grows_with_strength_and_is_capped() {
        let r = integrator();
        let mut last = -1.0;
        for v in [50.0, 60.0, 70.0, 85.0, 100.0] {
            let size = r.position_size_fraction(s(v), Side::Long);
            assert!(size >= last);
            assert!(size <= 0.10 + 1e-12);
            last = size;
        }
        assert_eq!(r.position_size_fraction(s(50.0), Side::Long), 0.0);
        assert!((r.position_size_fraction(s(100.0), Side::Long) - 0.10).abs() < 1e-12);
        assert!((r.position_size_fraction(s(0.0), Side::Short) - 0.10).abs() < 1e-12);
    }

    #[test]
    fn stop_widens_with_strength_per_side() {
        let r = integrator();
        let weak = r.stop_loss_distance(s(72.0), Side::Long);
        let strong = r.stop_loss_distance(s(95.0), Side::Long);
        assert!(strong > weak);
        // min 1.0x, max 2.0x of 1.5 % for longs.
        assert!((r.stop_loss_distance(s(50.0), Side::Long) - 1.5).abs() < 1e-12);
        assert!((r.stop_loss_distance(s(100.0), Side::Long) - 3.0).abs() < 1e-12);
        assert!((r.stop_loss_distance(s(0.0), Side::Short) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn neutral_decision_is_flat() {
        let p = integrator().parameters(s(65.0), Decision::Neutral, None);
        assert_eq!(p, RiskParameters::flat());
    }

    #[test]
    fn buy_decision_sizes_a_long() {
        let p = integrator().parameters(s(80.0), Decision::Buy, None);
        assert_eq!(p.side, Some(Side::Long));
        assert!((p.position_size_fraction - 0.06).abs() < 1e-12);
        assert!((p.stop_multiplier - 1.6).abs() < 1e-12);
        assert!((p.stop_loss_distance_pct - 2.4).abs() < 1e-9);
        assert!(p.overlay.is_none());
    }

    #[test]
    fn haircut_overlay_only_shrinks() {
        let cfg = RiskConfiguration {
            enable_quality_haircut: true,
            ..RiskConfiguration::default()
        };
        let r = RiskIntegrator::new(&cfg);
        let weak = QualityContext {
            confidence: 0.1,
            consensus: 0.9,
            disagreement: 0.05,
        };
        let strong = QualityContext {
            confidence: 0.7,
            consensus: 0.95,
            disagreement: 0.02,
        };

        let cut = r.parameters(s(90.0), Decision::Buy, Some(&weak));
        let full = r.parameters(s(90.0), Decision::Buy, Some(&strong));

        assert_eq!(cut.overlay.as_deref(), Some("quality_haircut"));
        assert!(full.overlay.is_none());
        assert!((cut.position_size_fraction - full.position_size_fraction * 0.5).abs() < 1e-12);
        assert!(cut.stop_loss_distance_pct < full.stop_loss_distance_pct);
        assert!(cut.stop_multiplier >= cfg.min_stop_multiplier);
    }

    struct Greedy;

    impl RiskOverlay for Greedy {
        fn name(&self) -> &'static str {
            "greedy"
        }

        fn adjust(&self, _quality: &QualityContext) -> Option<OverlayAdjustment> {
            Some(OverlayAdjustment {
                size_scale: 3.0,
                stop_scale: 5.0,
            })
        }
    }

    #[test]
    fn custom_overlay_cannot_enlarge() {
        let r = integrator().with_overlay(Arc::new(Greedy));
        let q = QualityContext {
            confidence: 0.5,
            consensus: 0.5,
            disagreement: 0.5,
        };
        let base = integrator().parameters(s(20.0), Decision::Sell, None);
        let p = r.parameters(s(20.0), Decision::Sell, Some(&q));
        assert_eq!(p.side, Some(Side::Short));
        assert!((p.position_size_fraction - base.position_size_fraction).abs() < 1e-12);
        assert!((p.stop_loss_distance_pct - base.stop_loss_distance_pct).abs() < 1e-12);
    }
}
