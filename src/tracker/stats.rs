// =============================================================================
// Quality statistics — offline read-only views over tracked entries
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OutcomeRecord, QualityMetricsLogEntry};
use crate::evaluation::FilterReason;
use crate::scoring::AdjustmentKind;
use crate::types::Decision;

pub const CONSENSUS_BUCKETS: usize = 10;

/// Which entries a query covers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum QueryWindow {
    #[default]
    All,
    /// The most recent `n` entries (after symbol filtering).
    Last(usize),
    /// Entries with `timestamp >= since`.
    Since(DateTime<Utc>),
}

/// Read-only query interface over the quality metrics record.
pub trait QualityMetricsQuery {
    fn get_statistics(&self, window: QueryWindow, symbol: Option<&str>) -> QualityStatistics;

    fn get_filter_effectiveness(&self, window: QueryWindow) -> FilterEffectiveness;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionCounts {
    pub buy: u64,
    pub sell: u64,
    pub neutral: u64,
}

/// Amplification rate band the adjuster is tuned toward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetBand {
    pub low: f64,
    pub high: f64,
}

impl TargetBand {
    pub fn contains(&self, rate: f64) -> bool {
        rate >= self.low && rate <= self.high
    }
}

/// Realized outcome summary for one adjustment branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub count: u64,
    /// Share of outcomes with positive realized PnL.
    pub hit_rate: f64,
    pub mean_pnl_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityStatistics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub count: usize,
    pub mean_confidence: f64,
    pub median_confidence: f64,
    pub mean_consensus: f64,
    pub mean_disagreement: f64,
    pub amplification_rate: f64,
    pub dampening_rate: f64,
    /// Consensus counts in 10 equal buckets over [0, 1]; 1.0 falls in the last.
    pub consensus_histogram: Vec<u64>,
    pub decisions: DecisionCounts,
    pub target_band: TargetBand,
    /// `None` when the window is empty.
    pub amplification_within_target: Option<bool>,
    /// Realized outcomes per adjustment branch, only for branches that have any.
    pub outcomes: BTreeMap<AdjustmentKind, OutcomeSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterEffectiveness {
    pub total: usize,
    pub filtered: usize,
    pub fraction_filtered: f64,
    pub reasons: BTreeMap<FilterReason, usize>,
}

// =============================================================================
// Computation
// =============================================================================

/// Apply `window` to entries that are already in append order.
pub(crate) fn select<'a>(
    entries: impl DoubleEndedIterator<Item = &'a QualityMetricsLogEntry>,
    window: QueryWindow,
) -> Vec<&'a QualityMetricsLogEntry> {
    match window {
        QueryWindow::All => entries.collect(),
        QueryWindow::Last(n) => {
            let mut last: Vec<_> = entries.rev().take(n).collect();
            last.reverse();
            last
        }
        QueryWindow::Since(since) => entries.filter(|e| e.timestamp >= since).collect(),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn consensus_bucket(consensus: f64) -> usize {
    ((consensus.clamp(0.0, 1.0) * CONSENSUS_BUCKETS as f64) as usize).min(CONSENSUS_BUCKETS - 1)
}

pub(crate) fn statistics(
    entries: &[&QualityMetricsLogEntry],
    outcomes: &HashMap<String, OutcomeRecord>,
    symbol: Option<&str>,
    target_band: TargetBand,
) -> QualityStatistics {
    let count = entries.len();
    let amplified = entries
        .iter()
        .filter(|e| e.adjustment_type == AdjustmentKind::Amplified)
        .count();

    let mut consensus_histogram = vec![0u64; CONSENSUS_BUCKETS];
    let mut decisions = DecisionCounts::default();
    let mut pnl: BTreeMap<AdjustmentKind, Vec<f64>> = BTreeMap::new();

    for e in entries {
        consensus_histogram[consensus_bucket(e.consensus)] += 1;
        match e.decision {
            Decision::Buy => decisions.buy += 1,
            Decision::Sell => decisions.sell += 1,
            Decision::Neutral => decisions.neutral += 1,
        }
        if let Some(outcome) = outcomes.get(&e.evaluation_id) {
            pnl.entry(e.adjustment_type)
                .or_default()
                .push(outcome.realized_pnl_pct);
        }
    }

    let (amplification_rate, dampening_rate) = if count == 0 {
        (0.0, 0.0)
    } else {
        let rate = amplified as f64 / count as f64;
        (rate, 1.0 - rate)
    };

    let outcomes = pnl
        .into_iter()
        .map(|(kind, values)| {
            let hits = values.iter().filter(|v| **v > 0.0).count();
            let summary = OutcomeSummary {
                count: values.len() as u64,
                hit_rate: hits as f64 / values.len() as f64,
                mean_pnl_pct: mean(values.iter().copied()),
            };
            (kind, summary)
        })
        .collect();

    QualityStatistics {
        symbol: symbol.map(str::to_string),
        count,
        mean_confidence: mean(entries.iter().map(|e| e.confidence)),
        median_confidence: median(entries.iter().map(|e| e.confidence).collect()),
        mean_consensus: mean(entries.iter().map(|e| e.consensus)),
        mean_disagreement: mean(entries.iter().map(|e| e.disagreement)),
        amplification_rate,
        dampening_rate,
        consensus_histogram,
        decisions,
        target_band,
        amplification_within_target: (count > 0).then(|| target_band.contains(amplification_rate)),
        outcomes,
    }
}

pub(crate) fn filter_effectiveness(entries: &[&QualityMetricsLogEntry]) -> FilterEffectiveness {
    let mut reasons = BTreeMap::new();
    for reason in entries.iter().filter_map(|e| e.quality_filter) {
        *reasons.entry(reason).or_insert(0) += 1;
    }
    let filtered: usize = reasons.values().sum();
    let total = entries.len();

    FilterEffectiveness {
        total,
        filtered,
        fraction_filtered: if total == 0 { 0.0 } else { filtered as f64 / total as f64 },
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(vec![]), 0.0);
        assert_eq!(median(vec![0.3, 0.1, 0.2]), 0.2);
        assert!((median(vec![0.4, 0.1, 0.2, 0.3]) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn consensus_buckets_cover_closed_interval() {
        assert_eq!(consensus_bucket(0.0), 0);
        assert_eq!(consensus_bucket(0.099), 0);
        assert_eq!(consensus_bucket(0.1), 1);
        assert_eq!(consensus_bucket(0.95), 9);
        assert_eq!(consensus_bucket(1.0), 9);
    }

    #[test]
    fn target_band_is_inclusive() {
        let band = TargetBand { low: 0.08, high: 0.12 };
        assert!(band.contains(0.08));
        assert!(band.contains(0.12));
        assert!(!band.contains(0.13));
    }
}
