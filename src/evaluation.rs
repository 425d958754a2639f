// =============================================================================
// Evaluation Result — the single contract surface of the scoring engine
// =============================================================================
//
// Every evaluation tick produces exactly one `EvaluationResult`, including the
// degenerate ones (no components, degraded weights). Numeric problems are
// recovered in place and listed in `diagnostics`; nothing is raised.
//
// Consumers must read `adjusted_score`. `base_score` is carried for audit and
// offline tuning only.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::risk::RiskParameters;
use crate::scoring::{AdjustedScore, Adjustment, ComponentContribution};
use crate::types::{Decision, Dimension, DimensionMap};

/// A recovered problem attached to a result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticNote {
    /// Non-finite or out-of-range score; neutral substituted or clamped.
    MissingOrInvalid { dimension: Dimension },
    /// Dimension absent; zero weight.
    Gap { dimension: Dimension },
    /// Weight snapshot fell back to equal weighting because of invalid input.
    ConfigurationDegraded { version: u64 },
    /// Every present dimension had zero weight; equal shares were used.
    ZeroEffectiveWeight,
    /// No component present; neutral result.
    NoComponents,
}

/// Why a directional base score ended up as a NEUTRAL decision.
///
/// Observability only: it is derived after the decision is made and is never
/// an input to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    InsufficientData,
    LowConfidence,
    LowConsensus,
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientData => write!(f, "insufficient_data"),
            Self::LowConfidence => write!(f, "low_confidence"),
            Self::LowConsensus => write!(f, "low_consensus"),
        }
    }
}

/// Complete, immutable record of one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    /// Unique identifier (UUID v4), used to attach realized outcomes.
    pub id: String,

    pub symbol: String,

    pub timestamp: DateTime<Utc>,

    /// Weighted aggregate before quality adjustment, in [0, 100].
    pub base_score: f64,

    /// Authoritative score, in [0, 100].
    pub adjusted_score: AdjustedScore,

    /// Branch taken by the adjuster and the factor it applied.
    pub adjustment: Adjustment,

    /// `adjusted_score - base_score`. For a bearish base a negative value
    /// means amplification; for a bullish base a positive value does.
    /// Dampening always moves toward 50.
    pub quality_impact: f64,

    /// Weighted mean of normalized component scores, in [-1, 1].
    pub deviation: f64,

    pub consensus: f64,

    pub confidence: f64,

    pub disagreement: f64,

    /// Derived from `adjusted_score` only.
    pub decision: Decision,

    /// Position size and stop distance derived from `adjusted_score`.
    pub risk: RiskParameters,

    pub contributions: DimensionMap<Option<ComponentContribution>>,

    pub present_count: usize,

    /// Version of the weight snapshot used.
    pub weights_version: u64,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<DiagnosticNote>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_filter: Option<FilterReason>,
}

impl EvaluationResult {
    /// True when no component was usable; equivalent to "insufficient data".
    pub fn is_insufficient_data(&self) -> bool {
        self.present_count == 0
    }

    pub fn has_diagnostic(&self, note: &DiagnosticNote) -> bool {
        self.diagnostics.contains(note)
    }
}
