// =============================================================================
// Quality Adjuster — hybrid amplify / dampen rule
// =============================================================================
//
// The adjusted score is the only score decisions and risk sizing may consume.
//
//   d = base_score - 50                      (signed, carries the direction)
//
//   confidence > conf_threshold AND consensus > consensus_threshold
//     factor   = min(1 + max_amp, 1 + (confidence - conf_threshold) * max_amp / (1 - conf_threshold))
//     adjusted = clip(50 + d * factor)       → Amplified { factor }
//
//   otherwise
//     adjusted = clip(50 + d * confidence)   → Dampened { factor: confidence }
//
// Reading `quality_impact = adjusted - base`:
//   - bearish base (< 50): a negative impact means the signal was amplified
//   - bullish base (> 50): a positive impact means the signal was amplified
//   - dampening always moves the score toward 50, whatever the sign
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::runtime_config::RiskConfiguration;
use crate::scoring::aggregator::NEUTRAL_SCORE;
use crate::scoring::quality::QualityMetrics;

/// Which branch of the hybrid rule produced the adjusted score, with the
/// factor applied to the deviation from neutral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Adjustment {
    Amplified { factor: f64 },
    Dampened { factor: f64 },
}

impl Adjustment {
    pub fn factor(self) -> f64 {
        match self {
            Self::Amplified { factor } | Self::Dampened { factor } => factor,
        }
    }

    pub fn kind(self) -> AdjustmentKind {
        match self {
            Self::Amplified { .. } => AdjustmentKind::Amplified,
            Self::Dampened { .. } => AdjustmentKind::Dampened,
        }
    }

    pub fn is_amplified(self) -> bool {
        matches!(self, Self::Amplified { .. })
    }
}

/// Branch label without the factor, for logs and histograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Amplified,
    Dampened,
}

impl std::fmt::Display for AdjustmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amplified => write!(f, "amplified"),
            Self::Dampened => write!(f, "dampened"),
        }
    }
}

/// A quality-adjusted score in [0, 100].
///
/// Only the adjuster creates these, so the threshold evaluator and the risk
/// integrator cannot be handed a base score by mistake.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct AdjustedScore(f64);

impl AdjustedScore {
    pub(crate) fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 100.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Distance from neutral scaled to [0, 1].
    pub fn strength(self) -> f64 {
        ((self.0 - NEUTRAL_SCORE).abs() / NEUTRAL_SCORE).clamp(0.0, 1.0)
    }
}

/// Output of the adjuster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjusted {
    pub score: AdjustedScore,
    pub adjustment: Adjustment,
    /// `adjusted - base`. See the module header for how to read the sign.
    pub quality_impact: f64,
}

/// Gates and cap of the hybrid rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjusterParams {
    pub confidence_threshold: f64,
    pub consensus_threshold: f64,
    pub max_amplification: f64,
}

impl Default for AdjusterParams {
    fn default() -> Self {
        Self::from(&RiskConfiguration::default())
    }
}

impl From<&RiskConfiguration> for AdjusterParams {
    fn from(cfg: &RiskConfiguration) -> Self {
        Self {
            confidence_threshold: cfg.confidence_threshold,
            consensus_threshold: cfg.consensus_threshold,
            max_amplification: cfg.max_amplification,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityAdjuster {
    params: AdjusterParams,
}

impl QualityAdjuster {
    pub fn new(params: AdjusterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &AdjusterParams {
        &self.params
    }

    /// True when `quality` passes both gates of the amplified branch.
    pub fn qualifies_for_amplification(&self, quality: &QualityMetrics) -> bool {
        quality.confidence > self.params.confidence_threshold
            && quality.consensus > self.params.consensus_threshold
    }

    pub fn adjust(&self, base_score: f64, quality: &QualityMetrics) -> Adjusted {
        let deviation = base_score - NEUTRAL_SCORE;

        let adjustment = if self.qualifies_for_amplification(quality) {
            let p = &self.params;
            let cap = 1.0 + p.max_amplification;
            let range = 1.0 - p.confidence_threshold;
            let factor = if range > f64::EPSILON {
                cap.min(1.0 + (quality.confidence - p.confidence_threshold) * p.max_amplification / range)
            } else {
                cap
            };
            Adjustment::Amplified { factor }
        } else {
            Adjustment::Dampened {
                factor: quality.confidence,
            }
        };

        let score = AdjustedScore::new(NEUTRAL_SCORE + deviation * adjustment.factor());

        Adjusted {
            score,
            adjustment,
            quality_impact: score.value() - base_score,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn q(confidence: f64, consensus: f64) -> QualityMetrics {
        QualityMetrics {
            disagreement: -(consensus.ln()) / 2.0,
            consensus,
            confidence,
        }
    }

    #[test]
    fn high_quality_bullish_is_amplified_upward() {
        let adj = QualityAdjuster::default().adjust(80.0, &q(0.75, 0.95));
        // factor = 1 + 0.25 * 0.15 / 0.5 = 1.075
        assert!(matches!(adj.adjustment, Adjustment::Amplified { .. }));
        assert!((adj.adjustment.factor() - 1.075).abs() < 1e-12);
        assert!((adj.score.value() - 82.25).abs() < 1e-9);
        assert!(adj.quality_impact > 0.0);
    }

    #[test]
    fn high_quality_bearish_is_amplified_downward() {
        let adj = QualityAdjuster::default().adjust(20.0, &q(0.75, 0.95));
        assert!(adj.adjustment.is_amplified());
        assert!((adj.score.value() - 17.75).abs() < 1e-9);
        assert!(adj.quality_impact < 0.0, "bearish amplification is a negative impact");
    }

    #[test]
    fn factor_never_exceeds_cap() {
        let adj = QualityAdjuster::default().adjust(100.0, &q(1.0, 1.0));
        assert!((adj.adjustment.factor() - 1.15).abs() < 1e-12);
        assert_eq!(adj.score.value(), 100.0);
    }

    #[test]
    fn low_consensus_dampens_even_with_high_confidence() {
        let adj = QualityAdjuster::default().adjust(90.0, &q(0.7, 0.75));
        assert_eq!(adj.adjustment, Adjustment::Dampened { factor: 0.7 });
        assert!((adj.score.value() - 78.0).abs() < 1e-9);
    }

    #[test]
    fn dampening_moves_toward_neutral_from_both_sides() {
        let adjuster = QualityAdjuster::default();
        let up = adjuster.adjust(70.0, &q(0.3, 0.5));
        let down = adjuster.adjust(30.0, &q(0.3, 0.5));
        assert!((up.score.value() - 56.0).abs() < 1e-9);
        assert!((down.score.value() - 44.0).abs() < 1e-9);
        assert!(up.quality_impact < 0.0);
        assert!(down.quality_impact > 0.0);
    }

    #[test]
    fn thresholds_are_strict() {
        let adj = QualityAdjuster::default().adjust(80.0, &q(0.5, 0.99));
        assert!(!adj.adjustment.is_amplified());
    }

    #[test]
    fn amplification_range_tracks_configured_threshold() {
        let adjuster = QualityAdjuster::new(AdjusterParams {
            confidence_threshold: 0.6,
            consensus_threshold: 0.5,
            max_amplification: 0.2,
        });
        let adj = adjuster.adjust(75.0, &q(0.8, 0.9));
        // 1 + 0.2 * 0.2 / 0.4 = 1.1
        assert!((adj.adjustment.factor() - 1.1).abs() < 1e-12);
    }

    #[test]
    fn adjustment_serialises_with_type_tag() {
        let v = serde_json::to_value(Adjustment::Amplified { factor: 1.05 }).unwrap();
        assert_eq!(v["type"], serde_json::json!("amplified"));
        assert_eq!(v["factor"], serde_json::json!(1.05));
    }
}
