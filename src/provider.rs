// =============================================================================
// Component score providers
// =============================================================================
//
// Upstream analysers publish one score per dimension per symbol. The engine
// pulls them through this trait so the analysers themselves stay outside the
// crate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::types::{ComponentScores, Dimension};

/// Supplier of raw component scores. Missing dimensions are `None`.
pub trait ComponentScoreProvider: Send + Sync {
    fn scores(&self, symbol: &str, timestamp: DateTime<Utc>) -> ComponentScores;
}

/// Latest published score per symbol and dimension, held in memory.
///
/// Analysers call [`publish`](Self::publish) as they produce values; the
/// engine reads whatever is current when it evaluates.
#[derive(Debug, Default)]
pub struct InMemoryScoreProvider {
    latest: RwLock<HashMap<String, ComponentScores>>,
}

impl InMemoryScoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, symbol: &str, dimension: Dimension, score: f64) {
        self.latest
            .write()
            .entry(symbol.to_string())
            .or_default()
            .set(dimension, Some(score));
    }

    /// Replace every dimension for `symbol` at once.
    pub fn publish_all(&self, symbol: &str, scores: ComponentScores) {
        self.latest.write().insert(symbol.to_string(), scores);
    }

    /// Mark a dimension as unavailable, e.g. when its analyser stalls.
    pub fn retract(&self, symbol: &str, dimension: Dimension) {
        if let Some(scores) = self.latest.write().get_mut(symbol) {
            scores.set(dimension, None);
        }
    }
}

impl ComponentScoreProvider for InMemoryScoreProvider {
    fn scores(&self, symbol: &str, _timestamp: DateTime<Utc>) -> ComponentScores {
        self.latest.read().get(symbol).copied().unwrap_or_default()
    }
}
