// =============================================================================
// Threshold Evaluator — adjusted score → BUY / SELL / NEUTRAL
// =============================================================================

use crate::runtime_config::RiskConfiguration;
use crate::scoring::AdjustedScore;
use crate::types::Decision;

/// Stateless classifier. Accepts only an [`AdjustedScore`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdEvaluator {
    pub buy_threshold: f64,
    pub sell_threshold: f64,
}

impl ThresholdEvaluator {
    pub fn new(buy_threshold: f64, sell_threshold: f64) -> Self {
        Self {
            buy_threshold,
            sell_threshold,
        }
    }

    pub fn evaluate(&self, score: AdjustedScore) -> Decision {
        let s = score.value();
        if s >= self.buy_threshold {
            Decision::Buy
        } else if s <= self.sell_threshold {
            Decision::Sell
        } else {
            Decision::Neutral
        }
    }
}

impl Default for ThresholdEvaluator {
    fn default() -> Self {
        Self::from(&RiskConfiguration::default())
    }
}

impl From<&RiskConfiguration> for ThresholdEvaluator {
    fn from(cfg: &RiskConfiguration) -> Self {
        Self::new(cfg.buy_threshold, cfg.sell_threshold)
    }
}
