use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised at the scoring library boundary.
///
/// Numeric edge cases in component scores never surface here: they are
/// recovered in place and annotated on the result. Only weight input that
/// cannot be read or parsed is a hard failure.
#[derive(Error, Debug)]
pub enum ScoringError {
    // -- Weight configuration -------------------------------------------------
    #[error("weight configuration could not be parsed: {reason}")]
    UnparseableWeights { reason: String },

    #[error("unknown dimension '{0}' in weight configuration")]
    UnknownDimension(String),

    #[error("weight source unavailable: {reason}")]
    SourceUnavailable { reason: String },
}

/// Errors raised by the quality metrics tracker and its persisted log.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("out-of-order record for {symbol}: {timestamp} precedes last appended {last}")]
    OutOfOrder {
        symbol: String,
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("unknown evaluation id {0}")]
    UnknownEvaluation(String),

    #[error("outcome already recorded for evaluation {0}")]
    DuplicateOutcome(String),

    #[error("quality log writer is closed")]
    WriterClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
