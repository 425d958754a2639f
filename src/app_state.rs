// =============================================================================
// Central Application State — Quality Scoring Service
// =============================================================================
//
// Ties the scoring engine, the weight store and the quality tracker together
// for the REST API and the background reload loop.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - Runtime config is read-only after startup.
//   - parking_lot::RwLock for the recent-results ring.
//   - Engine, weight store and tracker manage their own interior mutability.
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::engine::ScoringEngine;
use crate::errors::ScoringError;
use crate::evaluation::EvaluationResult;
use crate::runtime_config::RuntimeConfig;
use crate::tracker::QualityMetricsTracker;
use crate::types::ComponentScores;
use crate::weights::{ReloadOutcome, WeightConfigurationSource, WeightStore};

/// Maximum number of recent evaluations kept for the API.
const MAX_RECENT_EVALUATIONS: usize = 100;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Incremented on every weight swap and every tracked evaluation.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RuntimeConfig>,

    pub weights: Arc<WeightStore>,
    pub weight_source: Arc<dyn WeightConfigurationSource>,

    pub engine: Arc<ScoringEngine>,
    pub tracker: Arc<QualityMetricsTracker>,

    pub recent_evaluations: RwLock<VecDeque<EvaluationResult>>,

    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: RuntimeConfig,
        weight_source: Arc<dyn WeightConfigurationSource>,
        engine: Arc<ScoringEngine>,
        tracker: Arc<QualityMetricsTracker>,
    ) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(config),
            weights: engine.weights().clone(),
            weight_source,
            engine,
            tracker,
            recent_evaluations: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVALUATIONS)),
            start_time: Utc::now(),
        }
    }

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    /// Evaluate, record in the tracker and keep in the recent ring. A tracker
    /// rejection is logged; the evaluation itself is still returned.
    pub fn evaluate_and_track(
        &self,
        symbol: &str,
        timestamp: DateTime<Utc>,
        scores: &ComponentScores,
    ) -> EvaluationResult {
        let result = self.engine.evaluate(symbol, timestamp, scores);

        if let Err(e) = self.tracker.append(&result) {
            warn!(symbol, error = %e, "evaluation not tracked");
        }

        {
            let mut recent = self.recent_evaluations.write();
            if recent.len() >= MAX_RECENT_EVALUATIONS {
                recent.pop_front();
            }
            recent.push_back(result.clone());
        }
        self.increment_version();

        result
    }

    /// Most recent evaluations, newest last.
    pub fn recent(&self, limit: usize) -> Vec<EvaluationResult> {
        let recent = self.recent_evaluations.read();
        let skip = recent.len().saturating_sub(limit);
        recent.iter().skip(skip).cloned().collect()
    }

    /// Reload weights from the configured source.
    pub fn reload_weights(&self) -> Result<ReloadOutcome, ScoringError> {
        let outcome = self.weights.reload_from(self.weight_source.as_ref())?;
        if let ReloadOutcome::Installed(snapshot) = &outcome {
            self.increment_version();
            info!(version = snapshot.version, source = %self.weight_source.describe(), "weights reloaded");
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("state_version", &self.current_state_version())
            .field("weights", &self.weights)
            .field("tracker", &self.tracker)
            .field("start_time", &self.start_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dimension;
    use crate::weights::{RawWeights, StaticWeightSource};

    fn state() -> AppState {
        let config = RuntimeConfig::default();
        let source: Arc<dyn WeightConfigurationSource> =
            Arc::new(StaticWeightSource::new(RawWeights::default()));
        let store = Arc::new(WeightStore::from_source(source.as_ref()));
        let engine = Arc::new(ScoringEngine::new(&config, store));
        let tracker = Arc::new(QualityMetricsTracker::from_config(&config));
        AppState::new(config, source, engine, tracker)
    }

    #[test]
    fn evaluate_and_track_records_everywhere() {
        let s = state();
        let scores = ComponentScores::default().with(Dimension::Volume, Some(65.0));
        let r = s.evaluate_and_track("BTCUSDT", Utc::now(), &scores);
        assert_eq!(s.tracker.len(), 1);
        assert_eq!(s.recent(10).len(), 1);
        assert_eq!(s.recent(10)[0].id, r.id);
        assert_eq!(s.current_state_version(), 2);
    }

    #[test]
    fn tracker_rejection_still_returns_result() {
        let s = state();
        let now = Utc::now();
        s.evaluate_and_track("BTCUSDT", now, &ComponentScores::default());
        let r = s.evaluate_and_track("BTCUSDT", now - chrono::Duration::seconds(5), &ComponentScores::default());
        assert_eq!(r.symbol, "BTCUSDT");
        assert_eq!(s.tracker.len(), 1);
        assert_eq!(s.recent(10).len(), 2);
    }

    #[test]
    fn recent_ring_is_bounded() {
        let s = state();
        let now = Utc::now();
        for _ in 0..(MAX_RECENT_EVALUATIONS + 5) {
            s.evaluate_and_track("ETHUSDT", now, &ComponentScores::default());
        }
        assert_eq!(s.recent(usize::MAX).len(), MAX_RECENT_EVALUATIONS);
        assert_eq!(s.recent(3).len(), 3);
    }

    #[test]
    fn unchanged_reload_keeps_version() {
        let s = state();
        let outcome = s.reload_weights().unwrap();
        assert!(matches!(outcome, ReloadOutcome::Unchanged(_)));
        assert_eq!(s.weights.version(), 1);
    }
}
