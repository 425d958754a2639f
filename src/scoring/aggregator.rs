// =============================================================================
// Normalizer & Weighted Aggregator
// =============================================================================
//
// Maps each raw [0, 100] component score to a signed [-1, 1] value and takes
// the weighted mean over the dimensions that are present. The effective
// weights (snapshot weights restricted to present dimensions, rescaled to sum
// 1.0) are kept on every contribution so the quality metrics can reuse them
// exactly.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::evaluation::DiagnosticNote;
use crate::types::{ComponentScores, Dimension, DimensionMap};
use crate::weights::WeightConfiguration;

/// Score of a perfectly neutral component.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// One present dimension's share of the base score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentContribution {
    /// Score after invalid-value substitution and range clamping.
    pub raw: f64,
    /// Signed value in [-1, 1].
    pub normalized: f64,
    /// Effective weight used for both mean and variance.
    pub weight: f64,
    /// `weight * normalized`.
    pub contribution: f64,
}

/// Output of the aggregation step.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub base_score: f64,
    /// Weighted mean of normalized scores, in [-1, 1].
    pub deviation: f64,
    pub contributions: DimensionMap<Option<ComponentContribution>>,
    pub diagnostics: Vec<DiagnosticNote>,
}

impl Aggregation {
    pub fn present_count(&self) -> usize {
        self.contributions.present_count()
    }

    pub fn present(&self) -> impl Iterator<Item = (Dimension, &ComponentContribution)> {
        self.contributions.present()
    }
}

/// Map a [0, 100] score onto [-1, 1], 50 being 0.
pub fn normalize_score(score: f64) -> f64 {
    ((score - NEUTRAL_SCORE) / NEUTRAL_SCORE).clamp(-1.0, 1.0)
}

/// Weighted aggregation of `scores` under `weights`.
pub fn aggregate(scores: &ComponentScores, weights: &WeightConfiguration) -> Aggregation {
    let mut diagnostics = Vec::new();

    // Sanitise inputs first: (dimension, cleaned score, snapshot weight).
    let mut present: Vec<(Dimension, f64, f64)> = Vec::with_capacity(Dimension::COUNT);
    for (dimension, score) in scores.iter() {
        match *score {
            None => diagnostics.push(DiagnosticNote::Gap { dimension }),
            Some(value) => {
                let cleaned = if !value.is_finite() {
                    diagnostics.push(DiagnosticNote::MissingOrInvalid { dimension });
                    NEUTRAL_SCORE
                } else if !(0.0..=100.0).contains(&value) {
                    diagnostics.push(DiagnosticNote::MissingOrInvalid { dimension });
                    value.clamp(0.0, 100.0)
                } else {
                    value
                };
                present.push((dimension, cleaned, weights.weight(dimension)));
            }
        }
    }

    if present.is_empty() {
        diagnostics.push(DiagnosticNote::NoComponents);
        return Aggregation {
            base_score: NEUTRAL_SCORE,
            deviation: 0.0,
            contributions: DimensionMap::default(),
            diagnostics,
        };
    }

    let weight_sum: f64 = present.iter().map(|(_, _, w)| *w).sum();
    let equal_share = 1.0 / present.len() as f64;
    let zero_effective = weight_sum <= f64::EPSILON;
    if zero_effective {
        diagnostics.push(DiagnosticNote::ZeroEffectiveWeight);
    }

    let mut contributions = DimensionMap::default();
    let mut deviation = 0.0;
    for (dimension, raw, weight) in present {
        let weight = if zero_effective {
            equal_share
        } else {
            weight / weight_sum
        };
        let normalized = normalize_score(raw);
        let contribution = weight * normalized;
        deviation += contribution;
        contributions.set(
            dimension,
            Some(ComponentContribution {
                raw,
                normalized,
                weight,
                contribution,
            }),
        );
    }

    let deviation = deviation.clamp(-1.0, 1.0);
    let base_score = (NEUTRAL_SCORE + NEUTRAL_SCORE * deviation).clamp(0.0, 100.0);

    Aggregation {
        base_score,
        deviation,
        contributions,
        diagnostics,
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::RawWeights;

    fn equal() -> WeightConfiguration {
        WeightConfiguration::equal()
    }

    #[test]
    fn normalize_score_maps_range() {
        assert_eq!(normalize_score(50.0), 0.0);
        assert_eq!(normalize_score(100.0), 1.0);
        assert_eq!(normalize_score(0.0), -1.0);
        assert!((normalize_score(75.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_input_is_neutral() {
        let agg = aggregate(&ComponentScores::default(), &equal());
        assert_eq!(agg.base_score, 50.0);
        assert_eq!(agg.deviation, 0.0);
        assert_eq!(agg.present_count(), 0);
        assert!(agg.diagnostics.contains(&DiagnosticNote::NoComponents));
        assert_eq!(
            agg.diagnostics
                .iter()
                .filter(|d| matches!(d, DiagnosticNote::Gap { .. }))
                .count(),
            6
        );
    }

    #[test]
    fn absent_dimensions_do_not_dilute_the_mean() {
        let scores = ComponentScores::default()
            .with(Dimension::Technical, Some(80.0))
            .with(Dimension::Volume, Some(80.0));
        let agg = aggregate(&scores, &equal());
        assert!((agg.base_score - 80.0).abs() < 1e-9);
        assert_eq!(agg.present_count(), 2);
        let c = agg.contributions[Dimension::Technical].unwrap();
        assert!((c.weight - 0.5).abs() < 1e-12);
    }

    #[test]
    fn weighted_mean_follows_snapshot_weights() {
        let weights = WeightConfiguration::from_raw(
            1,
            &RawWeights::default()
                .with(Dimension::Technical, Some(0.75))
                .with(Dimension::Volume, Some(0.25)),
        );
        let scores = ComponentScores::default()
            .with(Dimension::Technical, Some(100.0))
            .with(Dimension::Volume, Some(0.0));
        let agg = aggregate(&scores, &weights);
        // 0.75 * 1 + 0.25 * -1 = 0.5
        assert!((agg.deviation - 0.5).abs() < 1e-12);
        assert!((agg.base_score - 75.0).abs() < 1e-9);
    }

    #[test]
    fn nan_is_substituted_with_neutral_and_flagged() {
        let scores = ComponentScores::default()
            .with(Dimension::Sentiment, Some(f64::NAN))
            .with(Dimension::Orderbook, Some(70.0));
        let agg = aggregate(&scores, &equal());
        let s = agg.contributions[Dimension::Sentiment].unwrap();
        assert_eq!(s.raw, 50.0);
        assert_eq!(s.normalized, 0.0);
        assert!(agg.diagnostics.contains(&DiagnosticNote::MissingOrInvalid {
            dimension: Dimension::Sentiment
        }));
        assert!((agg.base_score - 60.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_is_clamped_and_flagged() {
        let scores = ComponentScores::default().with(Dimension::Volume, Some(140.0));
        let agg = aggregate(&scores, &equal());
        assert_eq!(agg.base_score, 100.0);
        assert!(agg.diagnostics.contains(&DiagnosticNote::MissingOrInvalid {
            dimension: Dimension::Volume
        }));
    }

    #[test]
    fn zero_weight_on_every_present_dimension_uses_equal_share() {
        let weights = WeightConfiguration::from_raw(
            1,
            &RawWeights::default().with(Dimension::Sentiment, Some(1.0)),
        );
        let scores = ComponentScores::default()
            .with(Dimension::Technical, Some(60.0))
            .with(Dimension::Volume, Some(80.0));
        let agg = aggregate(&scores, &weights);
        assert!(agg.diagnostics.contains(&DiagnosticNote::ZeroEffectiveWeight));
        assert!((agg.base_score - 70.0).abs() < 1e-9);
    }
}
