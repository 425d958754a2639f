// =============================================================================
// Weight Configuration Store — versioned, atomically swapped weight snapshots
// =============================================================================
//
// A `WeightConfiguration` is immutable once built. Reloading builds a new
// snapshot with the next version number and swaps the `Arc` under a write lock
// that is held only for version allocation and the pointer replacement, so
// evaluations never observe a partially-updated map and never wait on file I/O.
//
// Validation policy:
//   - empty source          → equal weighting over present dimensions
//   - negative / non-finite / all-zero weights
//                           → equal weighting, snapshot flagged `degraded`
//   - dimension not listed  → weight 0 for that dimension
//   - unreadable / unparseable input
//                           → hard failure, the previous snapshot is kept
// =============================================================================

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::ScoringError;
use crate::types::{Dimension, DimensionMap};

/// Dimension → weight as supplied by a source, before validation.
pub type RawWeights = DimensionMap<Option<f64>>;

const SUM_TOLERANCE: f64 = 1e-12;

// =============================================================================
// Validation
// =============================================================================

/// Why a raw weight map could not be used as-is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum WeightIssue {
    Negative { dimension: Dimension },
    NonFinite { dimension: Dimension },
    AllZero,
}

impl std::fmt::Display for WeightIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Negative { dimension } => write!(f, "negative weight for {dimension}"),
            Self::NonFinite { dimension } => write!(f, "non-finite weight for {dimension}"),
            Self::AllZero => write!(f, "weights sum to zero"),
        }
    }
}

/// Rescale `weights` so they sum to 1.0. Returns `None` if the sum is zero.
/// Normalising an already-normalised map is a no-op.
pub fn normalize(weights: &DimensionMap<f64>) -> Option<DimensionMap<f64>> {
    let sum: f64 = weights.iter().map(|(_, w)| *w).sum();
    if sum <= SUM_TOLERANCE {
        return None;
    }
    if (sum - 1.0).abs() <= SUM_TOLERANCE {
        return Some(*weights);
    }
    Some(weights.map(|_, w| w / sum))
}

/// Validate raw weights and normalise them to sum 1.0.
pub fn validate_weights(raw: &RawWeights) -> Result<DimensionMap<f64>, WeightIssue> {
    for (dimension, weight) in raw.present() {
        if !weight.is_finite() {
            return Err(WeightIssue::NonFinite { dimension });
        }
        if *weight < 0.0 {
            return Err(WeightIssue::Negative { dimension });
        }
    }
    let filled = raw.map(|_, w| w.unwrap_or(0.0));
    normalize(&filled).ok_or(WeightIssue::AllZero)
}

fn equal_weights() -> DimensionMap<f64> {
    DimensionMap::from_fn(|_| 1.0 / Dimension::COUNT as f64)
}

// =============================================================================
// WeightConfiguration
// =============================================================================

/// One immutable, versioned weight snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightConfiguration {
    pub version: u64,
    weights: DimensionMap<f64>,
    /// True when the source was empty or invalid and equal weighting is used.
    pub equal_weighting: bool,
    /// True when equal weighting was forced by invalid input.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<WeightIssue>,
    pub loaded_at: DateTime<Utc>,
}

impl WeightConfiguration {
    /// Build a snapshot from raw source weights. Never fails: invalid input
    /// yields a degraded equal-weight snapshot.
    pub fn from_raw(version: u64, raw: &RawWeights) -> Self {
        let (weights, equal_weighting, issue) = if raw.is_empty() {
            (equal_weights(), true, None)
        } else {
            match validate_weights(raw) {
                Ok(w) => (w, false, None),
                Err(issue) => (equal_weights(), true, Some(issue)),
            }
        };

        Self {
            version,
            weights,
            equal_weighting,
            degraded: issue.is_some(),
            issue,
            loaded_at: Utc::now(),
        }
    }

    /// Equal weighting, version 0. Used before any source has been read.
    pub fn equal() -> Self {
        Self::from_raw(0, &RawWeights::default())
    }

    pub fn weight(&self, dimension: Dimension) -> f64 {
        self.weights[dimension]
    }

    pub fn weights(&self) -> &DimensionMap<f64> {
        &self.weights
    }

    fn same_weights(&self, other: &Self) -> bool {
        self.degraded == other.degraded
            && self
                .weights
                .iter()
                .all(|(d, w)| (w - other.weights[d]).abs() <= SUM_TOLERANCE)
    }
}

// =============================================================================
// Sources
// =============================================================================

/// Supplier of raw dimension weights.
pub trait WeightConfigurationSource: Send + Sync {
    fn load(&self) -> Result<RawWeights, ScoringError>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

/// Parse a JSON object of `dimension name → weight`.
///
/// Unknown dimension names, non-numeric values and two keys naming the same
/// dimension (`"momentum"` next to `"technical"`) are parse failures.
pub fn parse_weights_json(content: &str) -> Result<RawWeights, ScoringError> {
    let map: BTreeMap<String, f64> =
        serde_json::from_str(content).map_err(|e| ScoringError::UnparseableWeights {
            reason: e.to_string(),
        })?;

    let mut raw = RawWeights::default();
    for (name, weight) in map {
        let dimension =
            Dimension::parse(&name).ok_or_else(|| ScoringError::UnknownDimension(name.clone()))?;
        if raw[dimension].is_some() {
            return Err(ScoringError::UnparseableWeights {
                reason: format!("'{name}' sets {dimension} a second time"),
            });
        }
        raw.set(dimension, Some(weight));
    }
    Ok(raw)
}

/// Weights read from a JSON file on every `load`.
#[derive(Debug, Clone)]
pub struct JsonFileWeightSource {
    path: PathBuf,
}

impl JsonFileWeightSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl WeightConfigurationSource for JsonFileWeightSource {
    fn load(&self) -> Result<RawWeights, ScoringError> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| ScoringError::SourceUnavailable {
                reason: format!("{}: {e}", self.path.display()),
            })?;
        parse_weights_json(&content)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Fixed in-memory weights.
#[derive(Debug, Clone, Default)]
pub struct StaticWeightSource {
    weights: RawWeights,
}

impl StaticWeightSource {
    pub fn new(weights: RawWeights) -> Self {
        Self { weights }
    }
}

impl WeightConfigurationSource for StaticWeightSource {
    fn load(&self) -> Result<RawWeights, ScoringError> {
        Ok(self.weights)
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

// =============================================================================
// WeightStore
// =============================================================================

/// Result of a reload attempt that did not fail.
#[derive(Debug, Clone)]
pub enum ReloadOutcome {
    Installed(Arc<WeightConfiguration>),
    Unchanged(Arc<WeightConfiguration>),
}

impl ReloadOutcome {
    pub fn snapshot(&self) -> &Arc<WeightConfiguration> {
        match self {
            Self::Installed(s) | Self::Unchanged(s) => s,
        }
    }
}

/// Holder of the current weight snapshot.
///
/// Version allocation and the pointer swap happen under the same write guard,
/// so published versions are strictly increasing.
pub struct WeightStore {
    current: RwLock<Arc<WeightConfiguration>>,
}

impl WeightStore {
    /// Create a store whose first snapshot (version 1) is built from `raw`.
    pub fn new(raw: &RawWeights) -> Self {
        let snapshot = WeightConfiguration::from_raw(1, raw);
        log_snapshot(&snapshot, "initial");
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Create a store from a source. A source that cannot be read at startup
    /// leaves the store on degraded equal weighting until a reload succeeds.
    pub fn from_source(source: &dyn WeightConfigurationSource) -> Self {
        match source.load() {
            Ok(raw) => Self::new(&raw),
            Err(e) => {
                warn!(source = %source.describe(), error = %e, "weight source unreadable at startup, using equal weighting");
                let mut snapshot = WeightConfiguration::equal();
                snapshot.version = 1;
                snapshot.degraded = true;
                Self {
                    current: RwLock::new(Arc::new(snapshot)),
                }
            }
        }
    }

    /// The snapshot evaluations should use. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<WeightConfiguration> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Build and install a new snapshot from `raw`. Invalid weights install a
    /// degraded equal-weight snapshot; they are not rejected.
    pub fn install(&self, raw: &RawWeights) -> Arc<WeightConfiguration> {
        let snapshot = {
            let mut current = self.current.write();
            let snapshot = Arc::new(WeightConfiguration::from_raw(current.version + 1, raw));
            *current = snapshot.clone();
            snapshot
        };
        log_snapshot(&snapshot, "installed");
        snapshot
    }

    /// Reload from `source`. A read or parse failure is returned and the
    /// current snapshot stays in service. Weights identical to the current
    /// snapshot do not create a new version.
    pub fn reload_from(
        &self,
        source: &dyn WeightConfigurationSource,
    ) -> Result<ReloadOutcome, ScoringError> {
        // Source I/O stays outside the lock.
        let raw = match source.load() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    source = %source.describe(),
                    version = self.version(),
                    error = %e,
                    "weight reload rejected, keeping last good snapshot"
                );
                return Err(e);
            }
        };

        let snapshot = {
            let mut current = self.current.write();
            let candidate = WeightConfiguration::from_raw(current.version + 1, &raw);
            if candidate.same_weights(&current) {
                return Ok(ReloadOutcome::Unchanged(current.clone()));
            }
            let snapshot = Arc::new(candidate);
            *current = snapshot.clone();
            snapshot
        };
        log_snapshot(&snapshot, "installed");
        Ok(ReloadOutcome::Installed(snapshot))
    }
}

impl std::fmt::Debug for WeightStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightStore")
            .field("version", &self.version())
            .finish()
    }
}

fn log_snapshot(snapshot: &WeightConfiguration, action: &str) {
    if let Some(issue) = snapshot.issue {
        warn!(
            version = snapshot.version,
            issue = %issue,
            "weight configuration degraded, falling back to equal weighting"
        );
    } else {
        info!(
            version = snapshot.version,
            equal_weighting = snapshot.equal_weighting,
            action,
            "weight snapshot active"
        );
    }
}
