// =============================================================================
// Quality Metrics Tracker — append-only record of evaluation quality
// =============================================================================
//
// Records the quality fields of every evaluation for offline tuning of the
// confidence/consensus thresholds and the amplification cap. The live decision
// path writes here and never reads back.
//
// Memory holds the most recent `capacity` entries for queries; the JSON-lines
// log (optional) keeps everything. Realized outcomes are separate records keyed
// by evaluation id, so evaluation entries are never rewritten.
// =============================================================================

pub mod log;
pub mod stats;

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::TrackerError;
use crate::evaluation::{EvaluationResult, FilterReason};
use crate::runtime_config::RuntimeConfig;
use crate::scoring::AdjustmentKind;
use crate::types::Decision;

pub use self::log::{read_log, LogReadReport, LogRecord, QualityLogWriter};
pub use self::stats::{
    DecisionCounts, FilterEffectiveness, OutcomeSummary, QualityMetricsQuery, QualityStatistics,
    QueryWindow, TargetBand,
};

// =============================================================================
// Records
// =============================================================================

/// Quality projection of one `EvaluationResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetricsLogEntry {
    pub evaluation_id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub consensus: f64,
    pub confidence: f64,
    pub disagreement: f64,
    pub adjustment_type: AdjustmentKind,
    pub adjustment_factor: f64,
    pub base_score: f64,
    pub adjusted_score: f64,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_filter: Option<FilterReason>,
    #[serde(default)]
    pub weights_version: u64,
}

impl From<&EvaluationResult> for QualityMetricsLogEntry {
    fn from(r: &EvaluationResult) -> Self {
        Self {
            evaluation_id: r.id.clone(),
            timestamp: r.timestamp,
            symbol: r.symbol.clone(),
            consensus: r.consensus,
            confidence: r.confidence,
            disagreement: r.disagreement,
            adjustment_type: r.adjustment.kind(),
            adjustment_factor: r.adjustment.factor(),
            base_score: r.base_score,
            adjusted_score: r.adjusted_score.value(),
            decision: r.decision,
            quality_filter: r.quality_filter,
            weights_version: r.weights_version,
        }
    }
}

/// Realized result of acting on an evaluation, recorded later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub evaluation_id: String,
    pub recorded_at: DateTime<Utc>,
    pub realized_pnl_pct: f64,
}

/// What `replay` did with a batch of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub evaluations: usize,
    pub outcomes: usize,
    pub rejected: usize,
}

// =============================================================================
// Tracker
// =============================================================================

struct TrackerInner {
    entries: VecDeque<QualityMetricsLogEntry>,
    outcomes: HashMap<String, OutcomeRecord>,
    last_timestamp: HashMap<String, DateTime<Utc>>,
    total_appended: u64,
    sink: Option<mpsc::UnboundedSender<LogRecord>>,
}

pub struct QualityMetricsTracker {
    inner: Mutex<TrackerInner>,
    capacity: usize,
    target_band: TargetBand,
}

impl QualityMetricsTracker {
    pub fn new(capacity: usize, target_band: TargetBand) -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                entries: VecDeque::new(),
                outcomes: HashMap::new(),
                last_timestamp: HashMap::new(),
                total_appended: 0,
                sink: None,
            }),
            capacity: capacity.max(1),
            target_band,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            config.tracker_memory_capacity,
            TargetBand {
                low: config.risk.amplification_target_low,
                high: config.risk.amplification_target_high,
            },
        )
    }

    /// Forward every accepted record to `sink` (normally a
    /// [`QualityLogWriter`] sender).
    pub fn with_log_sink(self, sink: mpsc::UnboundedSender<LogRecord>) -> Self {
        self.inner.lock().sink = Some(sink);
        self
    }

    /// Stop forwarding to the log so its writer can finish.
    pub fn detach_log(&self) {
        self.inner.lock().sink = None;
    }

    /// Rebuild a tracker from a persisted log. Malformed lines and records
    /// that fail replay are counted, not fatal.
    pub fn from_log(
        path: impl AsRef<Path>,
        capacity: usize,
        target_band: TargetBand,
    ) -> Result<(Self, ReplaySummary), TrackerError> {
        let report = read_log(path)?;
        let tracker = Self::new(capacity, target_band);
        let mut summary = tracker.replay(report.records);
        summary.rejected += report.skipped;
        Ok((tracker, summary))
    }

    pub fn target_band(&self) -> TargetBand {
        self.target_band
    }

    /// Entries currently held in memory.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries accepted since start, including evicted ones.
    pub fn total_appended(&self) -> u64 {
        self.inner.lock().total_appended
    }

    /// Record one evaluation. Entries for a symbol must arrive in timestamp
    /// order; equal timestamps are accepted.
    pub fn append(&self, result: &EvaluationResult) -> Result<(), TrackerError> {
        self.append_entry(QualityMetricsLogEntry::from(result))
    }

    pub fn append_entry(&self, entry: QualityMetricsLogEntry) -> Result<(), TrackerError> {
        let mut inner = self.inner.lock();
        self.insert(&mut inner, entry.clone())?;
        forward(&mut inner, LogRecord::Evaluation(entry));
        Ok(())
    }

    /// Attach a realized outcome to an evaluation still held in memory.
    pub fn record_outcome(
        &self,
        evaluation_id: &str,
        realized_pnl_pct: f64,
    ) -> Result<OutcomeRecord, TrackerError> {
        let record = OutcomeRecord {
            evaluation_id: evaluation_id.to_string(),
            recorded_at: Utc::now(),
            realized_pnl_pct,
        };

        let mut inner = self.inner.lock();
        insert_outcome(&mut inner, record.clone())?;
        forward(&mut inner, LogRecord::Outcome(record.clone()));

        info!(evaluation_id, realized_pnl_pct, "outcome recorded");
        Ok(record)
    }

    /// Load records into memory without forwarding them to the log.
    pub fn replay(&self, records: impl IntoIterator<Item = LogRecord>) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        let mut inner = self.inner.lock();

        for record in records {
            let applied = match record {
                LogRecord::Evaluation(entry) => self
                    .insert(&mut inner, entry)
                    .map(|_| summary.evaluations += 1),
                LogRecord::Outcome(outcome) => {
                    insert_outcome(&mut inner, outcome).map(|_| summary.outcomes += 1)
                }
            };
            if let Err(e) = applied {
                debug!(error = %e, "replay record rejected");
                summary.rejected += 1;
            }
        }

        info!(
            evaluations = summary.evaluations,
            outcomes = summary.outcomes,
            rejected = summary.rejected,
            "quality metrics replayed"
        );
        summary
    }

    fn insert(
        &self,
        inner: &mut TrackerInner,
        entry: QualityMetricsLogEntry,
    ) -> Result<(), TrackerError> {
        if let Some(last) = inner.last_timestamp.get(&entry.symbol) {
            if entry.timestamp < *last {
                return Err(TrackerError::OutOfOrder {
                    symbol: entry.symbol,
                    timestamp: entry.timestamp,
                    last: *last,
                });
            }
        }

        inner
            .last_timestamp
            .insert(entry.symbol.clone(), entry.timestamp);
        inner.entries.push_back(entry);
        inner.total_appended += 1;

        while inner.entries.len() > self.capacity {
            if let Some(evicted) = inner.entries.pop_front() {
                inner.outcomes.remove(&evicted.evaluation_id);
            }
        }
        Ok(())
    }
}

fn insert_outcome(inner: &mut TrackerInner, record: OutcomeRecord) -> Result<(), TrackerError> {
    if inner.outcomes.contains_key(&record.evaluation_id) {
        return Err(TrackerError::DuplicateOutcome(record.evaluation_id));
    }
    if !inner
        .entries
        .iter()
        .any(|e| e.evaluation_id == record.evaluation_id)
    {
        return Err(TrackerError::UnknownEvaluation(record.evaluation_id));
    }
    inner.outcomes.insert(record.evaluation_id.clone(), record);
    Ok(())
}

fn forward(inner: &mut TrackerInner, record: LogRecord) {
    let closed = match &inner.sink {
        Some(sink) => sink.send(record).is_err(),
        None => false,
    };
    if closed {
        warn!("quality log writer gone, continuing in memory only");
        inner.sink = None;
    }
}

impl QualityMetricsQuery for QualityMetricsTracker {
    fn get_statistics(&self, window: QueryWindow, symbol: Option<&str>) -> QualityStatistics {
        let inner = self.inner.lock();
        let selected = match symbol {
            Some(s) => stats::select(inner.entries.iter().filter(|e| e.symbol == s), window),
            None => stats::select(inner.entries.iter(), window),
        };
        stats::statistics(&selected, &inner.outcomes, symbol, self.target_band)
    }

    fn get_filter_effectiveness(&self, window: QueryWindow) -> FilterEffectiveness {
        let inner = self.inner.lock();
        let selected = stats::select(inner.entries.iter(), window);
        stats::filter_effectiveness(&selected)
    }
}

impl std::fmt::Debug for QualityMetricsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("QualityMetricsTracker")
            .field("entries", &inner.entries.len())
            .field("outcomes", &inner.outcomes.len())
            .field("capacity", &self.capacity)
            .field("logging", &inner.sink.is_some())
            .finish()
    }
}
