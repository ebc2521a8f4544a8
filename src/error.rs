//! Error types for the probe harness
//!
//! Each component owns one error enum; the driver folds them into [`BenchError`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the scheduling-priority capability.
#[derive(Debug, Error)]
pub enum PriorityError {
    /// Raising priority failed. Measurement continues unelevated.
    #[error("failed to raise scheduling priority: {0}")]
    RaiseFailed(#[source] io::Error),

    /// Restoring the previous priority failed. The process may now run above its baseline.
    #[error("failed to restore scheduling priority: {0}")]
    RestoreFailed(#[source] io::Error),
}

/// Usage and clock errors surfaced by probes and the collector.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe \"{label}\" is already running")]
    AlreadyRunning { label: String },

    #[error("probe \"{label}\" is not running, it can not be stopped")]
    NotRunning { label: String },

    #[error("probe \"{0}\" does not exist")]
    UnknownLabel(String),

    #[error("priority leaked while timing probe: {0}")]
    PriorityRestore(#[source] PriorityError),
}

impl ProbeError {
    /// True for Start-while-running and Stop-without-Start.
    pub fn is_state_error(&self) -> bool {
        matches!(self, ProbeError::AlreadyRunning { .. } | ProbeError::NotRunning { .. })
    }
}

/// Report artifact failures.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("report {} has header {found:?}, this record needs {expected:?}", path.display())]
    HeaderMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("failed to encode report row: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to encode report record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error of a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid settings {}: {reason}", path.display())]
    Settings { path: PathBuf, reason: String },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("benchmark worker failed: {0}")]
    Worker(String),
}
