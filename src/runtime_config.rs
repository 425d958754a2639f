// =============================================================================
// Runtime Configuration — Tunable engine settings, read once at startup
// =============================================================================
//
// Every threshold the scoring core consults lives here so that the engine can
// be retuned without a code change. All fields carry a serde default so that
// adding a field never breaks loading an older config file.
//
// `validate()` repairs values that would break a scoring invariant (inverted
// thresholds, a zero-width amplification range, stop multipliers out of order)
// and reports each repair so the caller can log it.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_weights_path() -> String {
    "config/weights.json".to_string()
}

fn default_quality_log_path() -> String {
    "data/quality_metrics.jsonl".to_string()
}

fn default_weights_reload_secs() -> u64 {
    30
}

fn default_persistent_gap_warn_after() -> u32 {
    5
}

fn default_tracker_memory_capacity() -> usize {
    100_000
}

fn default_buy_threshold() -> f64 {
    70.0
}

fn default_sell_threshold() -> f64 {
    30.0
}

fn default_confidence_threshold() -> f64 {
    0.50
}

fn default_consensus_threshold() -> f64 {
    0.75
}

fn default_max_amplification() -> f64 {
    0.15
}

fn default_amplification_target_low() -> f64 {
    0.08
}

fn default_amplification_target_high() -> f64 {
    0.12
}

fn default_min_stop_multiplier() -> f64 {
    1.0
}

fn default_max_stop_multiplier() -> f64 {
    2.0
}

fn default_long_stop_pct() -> f64 {
    1.5
}

fn default_short_stop_pct() -> f64 {
    2.0
}

fn default_max_position_fraction() -> f64 {
    0.10
}

fn default_haircut_min_confidence() -> f64 {
    0.30
}

fn default_haircut_max_disagreement() -> f64 {
    0.25
}

fn default_haircut_size_scale() -> f64 {
    0.5
}

fn default_haircut_stop_scale() -> f64 {
    0.8
}

// =============================================================================
// RiskConfiguration
// =============================================================================

/// Decision thresholds, quality-adjustment gates and risk sizing bounds.
///
/// The quality gates (`confidence_threshold`, `consensus_threshold`,
/// `max_amplification`) were derived empirically. They are tuned so that the
/// amplified branch fires in roughly `amplification_target_low ..
/// amplification_target_high` of evaluations; the tracker reports the observed
/// rate against that band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfiguration {
    /// Adjusted score at or above which the decision is BUY.
    #[serde(default = "default_buy_threshold")]
    pub buy_threshold: f64,

    /// Adjusted score at or below which the decision is SELL.
    #[serde(default = "default_sell_threshold")]
    pub sell_threshold: f64,

    /// Confidence must exceed this for the amplified branch.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Consensus must exceed this for the amplified branch.
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,

    /// Maximum boost applied by amplification (0.15 = 15 %).
    #[serde(default = "default_max_amplification")]
    pub max_amplification: f64,

    /// Lower edge of the amplification-rate tuning band.
    #[serde(default = "default_amplification_target_low")]
    pub amplification_target_low: f64,

    /// Upper edge of the amplification-rate tuning band.
    #[serde(default = "default_amplification_target_high")]
    pub amplification_target_high: f64,

    /// Stop multiplier applied at zero signal strength.
    #[serde(default = "default_min_stop_multiplier")]
    pub min_stop_multiplier: f64,

    /// Stop multiplier applied at full signal strength.
    #[serde(default = "default_max_stop_multiplier")]
    pub max_stop_multiplier: f64,

    /// Base stop distance for longs, percent of entry price.
    #[serde(default = "default_long_stop_pct")]
    pub long_stop_pct: f64,

    /// Base stop distance for shorts, percent of entry price.
    #[serde(default = "default_short_stop_pct")]
    pub short_stop_pct: f64,

    /// Upper bound on position size as a fraction of capital.
    #[serde(default = "default_max_position_fraction")]
    pub max_position_fraction: f64,

    // --- Quality haircut overlay -------------------------------------------

    /// Enables the quality haircut risk overlay.
    #[serde(default)]
    pub enable_quality_haircut: bool,

    /// Haircut applies when confidence is below this.
    #[serde(default = "default_haircut_min_confidence")]
    pub haircut_min_confidence: f64,

    /// Haircut applies when disagreement is above this.
    #[serde(default = "default_haircut_max_disagreement")]
    pub haircut_max_disagreement: f64,

    /// Position size multiplier under the haircut, in `[0, 1]`.
    #[serde(default = "default_haircut_size_scale")]
    pub haircut_size_scale: f64,

    /// Stop multiplier scale under the haircut, in `[0, 1]`.
    #[serde(default = "default_haircut_stop_scale")]
    pub haircut_stop_scale: f64,
}

impl Default for RiskConfiguration {
    fn default() -> Self {
        Self {
            buy_threshold: default_buy_threshold(),
            sell_threshold: default_sell_threshold(),
            confidence_threshold: default_confidence_threshold(),
            consensus_threshold: default_consensus_threshold(),
            max_amplification: default_max_amplification(),
            amplification_target_low: default_amplification_target_low(),
            amplification_target_high: default_amplification_target_high(),
            min_stop_multiplier: default_min_stop_multiplier(),
            max_stop_multiplier: default_max_stop_multiplier(),
            long_stop_pct: default_long_stop_pct(),
            short_stop_pct: default_short_stop_pct(),
            max_position_fraction: default_max_position_fraction(),
            enable_quality_haircut: false,
            haircut_min_confidence: default_haircut_min_confidence(),
            haircut_max_disagreement: default_haircut_max_disagreement(),
            haircut_size_scale: default_haircut_size_scale(),
            haircut_stop_scale: default_haircut_stop_scale(),
        }
    }
}

impl RiskConfiguration {
    /// Repair values that would violate a scoring invariant. Returns one
    /// message per repair.
    pub fn validate(&mut self) -> Vec<String> {
        let defaults = Self::default();
        let mut repairs = Vec::new();

        let mut unit = |name: &str, value: &mut f64, fallback: f64, upper: f64| {
            if !value.is_finite() || *value < 0.0 || *value > upper {
                repairs.push(format!("{name} {value} outside [0, {upper}], reset to {fallback}"));
                *value = fallback;
            }
        };
        unit("buy_threshold", &mut self.buy_threshold, defaults.buy_threshold, 100.0);
        unit("sell_threshold", &mut self.sell_threshold, defaults.sell_threshold, 100.0);
        // A confidence threshold of 1.0 leaves no room for the amplification ramp.
        unit("confidence_threshold", &mut self.confidence_threshold, defaults.confidence_threshold, 0.99);
        unit("consensus_threshold", &mut self.consensus_threshold, defaults.consensus_threshold, 1.0);
        unit("max_amplification", &mut self.max_amplification, defaults.max_amplification, 1.0);
        unit("amplification_target_low", &mut self.amplification_target_low, defaults.amplification_target_low, 1.0);
        unit("amplification_target_high", &mut self.amplification_target_high, defaults.amplification_target_high, 1.0);
        unit("max_position_fraction", &mut self.max_position_fraction, defaults.max_position_fraction, 1.0);
        unit("haircut_min_confidence", &mut self.haircut_min_confidence, defaults.haircut_min_confidence, 1.0);
        unit("haircut_size_scale", &mut self.haircut_size_scale, defaults.haircut_size_scale, 1.0);
        unit("haircut_stop_scale", &mut self.haircut_stop_scale, defaults.haircut_stop_scale, 1.0);
        unit("haircut_max_disagreement", &mut self.haircut_max_disagreement, defaults.haircut_max_disagreement, f64::MAX);

        if self.sell_threshold >= self.buy_threshold {
            repairs.push(format!(
                "sell_threshold {} must be below buy_threshold {}, both reset",
                self.sell_threshold, self.buy_threshold
            ));
            self.buy_threshold = defaults.buy_threshold;
            self.sell_threshold = defaults.sell_threshold;
        }

        if self.amplification_target_low > self.amplification_target_high {
            repairs.push("amplification target band inverted, swapped".to_string());
            std::mem::swap(&mut self.amplification_target_low, &mut self.amplification_target_high);
        }

        for (name, value, fallback) in [
            ("long_stop_pct", &mut self.long_stop_pct, defaults.long_stop_pct),
            ("short_stop_pct", &mut self.short_stop_pct, defaults.short_stop_pct),
            ("min_stop_multiplier", &mut self.min_stop_multiplier, defaults.min_stop_multiplier),
            ("max_stop_multiplier", &mut self.max_stop_multiplier, defaults.max_stop_multiplier),
        ] {
            if !value.is_finite() || *value <= 0.0 {
                repairs.push(format!("{name} {value} must be positive, reset to {fallback}"));
                *value = fallback;
            }
        }

        if self.min_stop_multiplier > self.max_stop_multiplier {
            repairs.push(format!(
                "min_stop_multiplier {} exceeds max_stop_multiplier {}, swapped",
                self.min_stop_multiplier, self.max_stop_multiplier
            ));
            std::mem::swap(&mut self.min_stop_multiplier, &mut self.max_stop_multiplier);
        }

        repairs
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the scoring service.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Files ---------------------------------------------------------------

    /// JSON file holding the dimension → weight map.
    #[serde(default = "default_weights_path")]
    pub weights_path: String,

    /// Append-only JSON-lines quality metrics log.
    #[serde(default = "default_quality_log_path")]
    pub quality_log_path: String,

    /// Poll interval for weight file hot-reload. 0 disables polling.
    #[serde(default = "default_weights_reload_secs")]
    pub weights_reload_secs: u64,

    // --- Observability -------------------------------------------------------

    /// Consecutive gaps of one dimension for one symbol before a warning is
    /// logged. 0 disables the warning.
    #[serde(default = "default_persistent_gap_warn_after")]
    pub persistent_gap_warn_after: u32,

    /// Number of log entries the tracker keeps in memory for queries.
    #[serde(default = "default_tracker_memory_capacity")]
    pub tracker_memory_capacity: usize,

    // --- Scoring & risk ------------------------------------------------------

    #[serde(default)]
    pub risk: RiskConfiguration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            weights_path: default_weights_path(),
            quality_log_path: default_quality_log_path(),
            weights_reload_secs: default_weights_reload_secs(),
            persistent_gap_warn_after: default_persistent_gap_warn_after(),
            tracker_memory_capacity: default_tracker_memory_capacity(),
            risk: RiskConfiguration::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            weights_path = %config.weights_path,
            buy_threshold = config.risk.buy_threshold,
            sell_threshold = config.risk.sell_threshold,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Validate and repair in place, logging every repair.
    pub fn validate(&mut self) {
        if self.tracker_memory_capacity == 0 {
            warn!("tracker_memory_capacity 0 is not usable, reset to default");
            self.tracker_memory_capacity = default_tracker_memory_capacity();
        }
        for repair in self.risk.validate() {
            warn!(repair = %repair, "runtime config repaired");
        }
    }
}
