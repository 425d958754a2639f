// =============================================================================
// Scoring Module
// =============================================================================
//
// Pure scoring pipeline, one step per file:
// - Normalizer & weighted aggregator (base score)
// - Quality metrics (disagreement, consensus, confidence)
// - Hybrid quality adjuster (adjusted score)

pub mod adjuster;
pub mod aggregator;
pub mod quality;

pub use adjuster::{Adjusted, AdjustedScore, Adjustment, AdjustmentKind, AdjusterParams, QualityAdjuster};
pub use aggregator::{aggregate, normalize_score, Aggregation, ComponentContribution, NEUTRAL_SCORE};
pub use quality::QualityMetrics;
