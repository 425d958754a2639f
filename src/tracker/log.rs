// =============================================================================
// Quality metrics log — append-only JSON lines on disk
// =============================================================================
//
// One writer task owns the file. Producers hand records over an unbounded
// channel and never wait on disk. The writer drains whatever is queued, then
// flushes, so a quiet period always leaves the file complete up to the last
// record sent.
//
// `read_log` is for batch tooling and startup replay: lines that do not parse
// (a partial line at the tail after a crash, a hand edit) are skipped and
// counted. Opening the writer on a file with a torn tail first ends that line.
// =============================================================================

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{OutcomeRecord, QualityMetricsLogEntry};
use crate::errors::TrackerError;

/// One line of the persisted log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum LogRecord {
    Evaluation(QualityMetricsLogEntry),
    Outcome(OutcomeRecord),
}

// =============================================================================
// Writer
// =============================================================================

/// Handle to the background writer task.
pub struct QualityLogWriter {
    tx: mpsc::UnboundedSender<LogRecord>,
    task: JoinHandle<std::io::Result<u64>>,
    path: PathBuf,
}

impl QualityLogWriter {
    /// Open `path` for append (creating parent directories) and start the
    /// writer task. Must be called inside a tokio runtime.
    pub async fn spawn(path: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        // A crash can leave a torn last line. Terminate it so the next record
        // starts on a line of its own.
        if ends_mid_line(&path).await? {
            warn!(path = %path.display(), "quality log ends mid-line, terminating it before appending");
            file.write_all(b"\n").await?;
            file.flush().await?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(writer_task(rx, file));

        info!(path = %path.display(), "quality metrics log opened");
        Ok(Self { tx, task, path })
    }

    /// A sender for producers. The task ends once every sender is dropped.
    pub fn sender(&self) -> mpsc::UnboundedSender<LogRecord> {
        self.tx.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop this handle's sender and wait for the task to flush. Returns the
    /// number of lines written. Other senders must be dropped first or this
    /// waits for them.
    pub async fn close(self) -> Result<u64, TrackerError> {
        drop(self.tx);
        let written = self.task.await.map_err(|_| TrackerError::WriterClosed)??;
        info!(path = %self.path.display(), written, "quality metrics log closed");
        Ok(written)
    }
}

impl std::fmt::Debug for QualityLogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityLogWriter")
            .field("path", &self.path)
            .finish()
    }
}

/// True when `path` is non-empty and its last byte is not a newline.
async fn ends_mid_line(path: &Path) -> std::io::Result<bool> {
    let mut file = tokio::fs::File::open(path).await?;
    if file.metadata().await?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

async fn writer_task(
    mut rx: mpsc::UnboundedReceiver<LogRecord>,
    file: tokio::fs::File,
) -> std::io::Result<u64> {
    let mut writer = BufWriter::new(file);
    let mut written = 0u64;

    while let Some(record) = rx.recv().await {
        written += write_record(&mut writer, &record).await?;
        while let Ok(record) = rx.try_recv() {
            written += write_record(&mut writer, &record).await?;
        }
        writer.flush().await?;
    }

    writer.flush().await?;
    Ok(written)
}

async fn write_record(
    writer: &mut BufWriter<tokio::fs::File>,
    record: &LogRecord,
) -> std::io::Result<u64> {
    match serde_json::to_string(record) {
        Ok(mut line) => {
            line.push('\n');
            writer.write_all(line.as_bytes()).await?;
            Ok(1)
        }
        Err(e) => {
            warn!(error = %e, "quality log record not serialisable, dropped");
            Ok(0)
        }
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Records read back from a log file.
#[derive(Debug, Default)]
pub struct LogReadReport {
    pub records: Vec<LogRecord>,
    /// Non-empty lines that did not parse.
    pub skipped: usize,
}

/// Read every record from `path`, skipping lines that do not parse. Lines
/// are split on raw bytes, so an invalid UTF-8 sequence costs only its own
/// line.
pub fn read_log(path: impl AsRef<Path>) -> Result<LogReadReport, TrackerError> {
    let path = path.as_ref();
    let content = std::fs::read(path)?;

    let mut report = LogReadReport::default();
    for (n, bytes) in content.split(|b| *b == b'\n').enumerate() {
        let line = match std::str::from_utf8(bytes) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!(path = %path.display(), line = n + 1, error = %e, "skipping quality log line that is not UTF-8");
                report.skipped += 1;
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(line) {
            Ok(record) => report.records.push(record),
            Err(e) => {
                warn!(path = %path.display(), line = n + 1, error = %e, "skipping malformed quality log line");
                report.skipped += 1;
            }
        }
    }
    Ok(report)
}
