// =============================================================================
// Quality Metrics Calculator
// =============================================================================
//
// Disagreement is the weighted variance of the normalized component scores
// around the weighted mean, using the same effective weights as the mean.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::scoring::aggregator::Aggregation;

/// Signal quality derived from one aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Weighted variance of normalized scores, >= 0.
    pub disagreement: f64,
    /// `exp(-2 * disagreement)`, in [0, 1].
    pub consensus: f64,
    /// `|deviation| * consensus`, in [0, 1].
    pub confidence: f64,
}

impl QualityMetrics {
    /// Metrics of an evaluation with no usable components.
    pub const TRIVIAL: Self = Self {
        disagreement: 0.0,
        consensus: 1.0,
        confidence: 0.0,
    };
}

/// Compute quality metrics from an aggregation.
pub fn compute(aggregation: &Aggregation) -> QualityMetrics {
    if aggregation.present_count() == 0 {
        return QualityMetrics::TRIVIAL;
    }

    let mean = aggregation.deviation;
    let disagreement = if aggregation.present_count() < 2 {
        0.0
    } else {
        aggregation
            .present()
            .map(|(_, c)| c.weight * (c.normalized - mean).powi(2))
            .sum::<f64>()
            .max(0.0)
    };

    let consensus = (-2.0 * disagreement).exp().clamp(0.0, 1.0);
    let confidence = (mean.clamp(-1.0, 1.0).abs() * consensus).clamp(0.0, 1.0);

    QualityMetrics {
        disagreement,
        consensus,
        confidence,
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::aggregator::aggregate;
    use crate::types::{ComponentScores, Dimension};
    use crate::weights::{RawWeights, WeightConfiguration};

    #[test]
    fn empty_aggregation_is_trivial() {
        let agg = aggregate(&ComponentScores::default(), &WeightConfiguration::equal());
        assert_eq!(compute(&agg), QualityMetrics::TRIVIAL);
    }

    #[test]
    fn single_component_has_full_consensus() {
        let scores = ComponentScores::default().with(Dimension::Orderflow, Some(90.0));
        let q = compute(&aggregate(&scores, &WeightConfiguration::equal()));
        assert_eq!(q.disagreement, 0.0);
        assert_eq!(q.consensus, 1.0);
        assert!((q.confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn unanimous_components_have_zero_disagreement() {
        let scores = ComponentScores::from_fn(|_| Some(65.0));
        let q = compute(&aggregate(&scores, &WeightConfiguration::equal()));
        assert!(q.disagreement.abs() < 1e-15);
        assert!((q.consensus - 1.0).abs() < 1e-12);
        assert!((q.confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn disagreement_is_weighted_variance() {
        let weights = WeightConfiguration::from_raw(
            1,
            &RawWeights::default()
                .with(Dimension::Technical, Some(0.75))
                .with(Dimension::Volume, Some(0.25)),
        );
        let scores = ComponentScores::default()
            .with(Dimension::Technical, Some(100.0))
            .with(Dimension::Volume, Some(0.0));
        let q = compute(&aggregate(&scores, &weights));
        // mean 0.5; 0.75 * 0.25 + 0.25 * 2.25 = 0.75
        assert!((q.disagreement - 0.75).abs() < 1e-12);
        assert!((q.consensus - (-1.5f64).exp()).abs() < 1e-12);
        assert!((q.confidence - 0.5 * (-1.5f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn low_weight_outlier_costs_less_than_high_weight_outlier() {
        let weights = WeightConfiguration::from_raw(
            1,
            &RawWeights::default()
                .with(Dimension::Orderbook, Some(0.6))
                .with(Dimension::Sentiment, Some(0.1))
                .with(Dimension::Volume, Some(0.3)),
        );
        let base = ComponentScores::default()
            .with(Dimension::Orderbook, Some(60.0))
            .with(Dimension::Sentiment, Some(60.0))
            .with(Dimension::Volume, Some(60.0));

        let low = base.with(Dimension::Sentiment, Some(90.0));
        let high = base.with(Dimension::Volume, Some(90.0));

        let d_low = compute(&aggregate(&low, &weights)).disagreement;
        let d_high = compute(&aggregate(&high, &weights)).disagreement;
        assert!(d_low < d_high, "low {d_low} should be < high {d_high}");
    }
}
