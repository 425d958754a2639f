// =============================================================================
// Quality Scoring Engine — library root
// =============================================================================
//
// Turns per-dimension component scores for a symbol into a quality-adjusted
// trading signal: base score, consensus/confidence metrics, adjusted score,
// BUY/SELL/NEUTRAL decision and risk parameters, all in one
// `EvaluationResult`.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
pub mod api;
pub mod app_state;
pub mod engine;
pub mod errors;
pub mod evaluation;
pub mod provider;
pub mod risk;
pub mod runtime_config;
pub mod scoring;
pub mod threshold;
pub mod tracker;
pub mod types;
pub mod weights;

pub use engine::{Evaluator, ScoringEngine};
pub use errors::{ScoringError, TrackerError};
pub use evaluation::{DiagnosticNote, EvaluationResult, FilterReason};
pub use provider::{ComponentScoreProvider, InMemoryScoreProvider};
pub use risk::{QualityHaircut, RiskIntegrator, RiskOverlay, RiskParameters};
pub use runtime_config::{RiskConfiguration, RuntimeConfig};
pub use scoring::{AdjustedScore, Adjustment, AdjustmentKind, QualityMetrics};
pub use threshold::ThresholdEvaluator;
pub use tracker::{QualityMetricsQuery, QualityMetricsTracker, QueryWindow};
pub use types::{ComponentScores, Decision, Dimension, DimensionMap, Side};
pub use weights::{
    JsonFileWeightSource, RawWeights, StaticWeightSource, WeightConfiguration,
    WeightConfigurationSource, WeightStore,
};
