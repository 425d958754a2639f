// =============================================================================
// Scoring Engine — one EvaluationResult per symbol per tick
// =============================================================================
//
// Pipeline:
//   1. Take the current weight snapshot (one Arc clone, no lock held after)
//   2. Normalise and aggregate component scores → base score
//   3. Quality metrics from the same effective weights
//   4. Hybrid adjustment → adjusted score
//   5. Threshold decision on the adjusted score
//   6. Risk parameters on the adjusted score
//   7. Annotate (diagnostics, quality filter reason)
//
// Steps 2–7 live in `evaluate_with`: no I/O and no shared state, only a
// fresh result id. The engine adds the snapshot read and the persistent-gap
// monitor, whose counters are locked per symbol, so evaluations for different
// symbols run in parallel.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::evaluation::{DiagnosticNote, EvaluationResult, FilterReason};
use crate::provider::ComponentScoreProvider;
use crate::risk::{QualityContext, RiskIntegrator, RiskOverlay};
use crate::runtime_config::RuntimeConfig;
use crate::scoring::{aggregate, quality, QualityAdjuster, QualityMetrics};
use crate::threshold::ThresholdEvaluator;
use crate::types::{ComponentScores, Decision, Dimension, DimensionMap};
use crate::weights::{WeightConfiguration, WeightStore};

/// Fewer present components than this makes a filtered signal count as
/// insufficient data rather than low quality.
const MIN_COMPONENTS_FOR_QUALITY: usize = 3;

// =============================================================================
// Pure evaluation
// =============================================================================

/// The stateless parts of the pipeline.
#[derive(Debug)]
pub struct Evaluator {
    pub adjuster: QualityAdjuster,
    pub thresholds: ThresholdEvaluator,
    pub risk: RiskIntegrator,
}

impl Evaluator {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            adjuster: QualityAdjuster::new((&config.risk).into()),
            thresholds: ThresholdEvaluator::from(&config.risk),
            risk: RiskIntegrator::new(&config.risk),
        }
    }

    /// Evaluate `scores` under `weights`. Deterministic apart from the
    /// generated result id: no I/O, no shared state.
    pub fn evaluate_with(
        &self,
        weights: &WeightConfiguration,
        symbol: &str,
        timestamp: DateTime<Utc>,
        scores: &ComponentScores,
    ) -> EvaluationResult {
        let aggregation = aggregate(scores, weights);
        let metrics = quality::compute(&aggregation);
        let adjusted = self.adjuster.adjust(aggregation.base_score, &metrics);
        let decision = self.thresholds.evaluate(adjusted.score);

        let quality_ctx = QualityContext {
            confidence: metrics.confidence,
            consensus: metrics.consensus,
            disagreement: metrics.disagreement,
        };
        let risk = self.risk.parameters(adjusted.score, decision, Some(&quality_ctx));

        let present_count = aggregation.present_count();
        let quality_filter = self.filter_reason(aggregation.base_score, decision, &metrics, present_count);

        let mut diagnostics = aggregation.diagnostics;
        if weights.degraded {
            diagnostics.push(DiagnosticNote::ConfigurationDegraded {
                version: weights.version,
            });
        }

        EvaluationResult {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            timestamp,
            base_score: aggregation.base_score,
            adjusted_score: adjusted.score,
            adjustment: adjusted.adjustment,
            quality_impact: adjusted.quality_impact,
            deviation: aggregation.deviation,
            consensus: metrics.consensus,
            confidence: metrics.confidence,
            disagreement: metrics.disagreement,
            decision,
            risk,
            contributions: aggregation.contributions,
            present_count,
            weights_version: weights.version,
            diagnostics,
            quality_filter,
        }
    }

    /// Why a base score past a threshold still produced NEUTRAL. Computed
    /// after the decision, for the tracker only.
    fn filter_reason(
        &self,
        base_score: f64,
        decision: Decision,
        metrics: &QualityMetrics,
        present_count: usize,
    ) -> Option<FilterReason> {
        let t = &self.thresholds;
        let base_directional = base_score >= t.buy_threshold || base_score <= t.sell_threshold;
        if decision != Decision::Neutral || !base_directional {
            return None;
        }

        let p = self.adjuster.params();
        Some(if present_count < MIN_COMPONENTS_FOR_QUALITY {
            FilterReason::InsufficientData
        } else if metrics.confidence <= p.confidence_threshold {
            FilterReason::LowConfidence
        } else {
            FilterReason::LowConsensus
        })
    }
}

// =============================================================================
// Persistent gap monitor
// =============================================================================

/// Counts consecutive gaps per symbol and dimension and warns once when a
/// streak reaches `warn_after`.
///
/// Only symbols with an open streak are kept. The map lock is shared on the
/// hot path; the write lock is taken to add a symbol or drop one whose
/// streaks have all closed.
struct GapMonitor {
    warn_after: u32,
    streaks: RwLock<HashMap<String, Mutex<DimensionMap<u32>>>>,
}

impl GapMonitor {
    fn new(warn_after: u32) -> Self {
        Self {
            warn_after,
            streaks: RwLock::new(HashMap::new()),
        }
    }

    fn observe(&self, result: &EvaluationResult) {
        if self.warn_after == 0 {
            return;
        }
        let symbol = result.symbol.as_str();

        let applied = {
            let streaks = self.streaks.read();
            match streaks.get(symbol) {
                Some(cell) => {
                    let mut counts = cell.lock();
                    self.advance(symbol, &mut counts, result);
                    if !all_closed(&counts) {
                        return;
                    }
                    true
                }
                None if result.contributions.present_count() == Dimension::COUNT => return,
                None => false,
            }
        };

        let mut streaks = self.streaks.write();
        let closed = {
            let counts = streaks.entry(symbol.to_string()).or_default().get_mut();
            if !applied {
                self.advance(symbol, counts, result);
            }
            all_closed(counts)
        };
        if closed {
            streaks.remove(symbol);
        }
    }

    fn advance(&self, symbol: &str, counts: &mut DimensionMap<u32>, result: &EvaluationResult) {
        for dimension in Dimension::ALL {
            if result.contributions[dimension].is_some() {
                counts[dimension] = 0;
                continue;
            }
            counts[dimension] = counts[dimension].saturating_add(1);
            if counts[dimension] == self.warn_after {
                warn!(
                    symbol,
                    dimension = %dimension,
                    consecutive = counts[dimension],
                    "component score persistently missing"
                );
            }
        }
    }

    fn streak(&self, symbol: &str, dimension: Dimension) -> u32 {
        self.streaks
            .read()
            .get(symbol)
            .map(|cell| cell.lock()[dimension])
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn tracked_symbols(&self) -> usize {
        self.streaks.read().len()
    }
}

fn all_closed(counts: &DimensionMap<u32>) -> bool {
    counts.iter().all(|(_, n)| *n == 0)
}

// =============================================================================
// Scoring Engine
// =============================================================================

pub struct ScoringEngine {
    weights: Arc<WeightStore>,
    evaluator: Evaluator,
    gaps: GapMonitor,
}

impl ScoringEngine {
    pub fn new(config: &RuntimeConfig, weights: Arc<WeightStore>) -> Self {
        Self {
            weights,
            evaluator: Evaluator::from_config(config),
            gaps: GapMonitor::new(config.persistent_gap_warn_after),
        }
    }

    /// Replace the configured risk overlay.
    pub fn with_overlay(mut self, overlay: Arc<dyn RiskOverlay>) -> Self {
        self.evaluator.risk = self.evaluator.risk.with_overlay(overlay);
        self
    }

    pub fn weights(&self) -> &Arc<WeightStore> {
        &self.weights
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Evaluate one symbol at one timestamp against the current weights.
    pub fn evaluate(
        &self,
        symbol: &str,
        timestamp: DateTime<Utc>,
        scores: &ComponentScores,
    ) -> EvaluationResult {
        let snapshot = self.weights.snapshot();
        let result = self.evaluator.evaluate_with(&snapshot, symbol, timestamp, scores);
        self.gaps.observe(&result);

        debug!(
            symbol,
            base = result.base_score,
            adjusted = result.adjusted_score.value(),
            adjustment = %result.adjustment.kind(),
            confidence = result.confidence,
            consensus = result.consensus,
            decision = %result.decision,
            weights_version = result.weights_version,
            "evaluation complete"
        );

        result
    }

    /// Pull component scores from `provider` and evaluate them.
    pub fn evaluate_from(
        &self,
        provider: &dyn ComponentScoreProvider,
        symbol: &str,
        timestamp: DateTime<Utc>,
    ) -> EvaluationResult {
        let scores = provider.scores(symbol, timestamp);
        self.evaluate(symbol, timestamp, &scores)
    }

    /// Current gap streak, for tests and diagnostics endpoints.
    pub fn gap_streak(&self, symbol: &str, dimension: Dimension) -> u32 {
        self.gaps.streak(symbol, dimension)
    }
}

impl std::fmt::Debug for ScoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringEngine")
            .field("weights", &self.weights)
            .field("evaluator", &self.evaluator)
            .finish()
    }
}
