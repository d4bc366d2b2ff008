//! Error taxonomy for a run.
//!
//! Per-item and per-page failures (discovery, enqueue, validation I/O) are
//! absorbed into ledger state by the orchestrator. Only `RunError` stops a run.

use std::path::PathBuf;
use std::time::Duration;

/// Page discovery failed. Transient: the page stays eligible for a later run.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("page {page} is not available: {reason}")]
    Unavailable { page: u32, reason: String },
    #[error("page {page} could not be parsed: {reason}")]
    Parse { page: u32, reason: String },
    #[error("discovery I/O for page {page}: {source}")]
    Io {
        page: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Handing an asset to the download agent failed. Counts toward the item's attempts.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("download agent is not configured")]
    NotConfigured,
    #[error("failed to launch download agent: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("download agent exited with {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },
    #[error("download agent did not answer within {0:?}")]
    Timeout(Duration),
    #[error("could not prepare {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reading or writing the ledger failed. Fatal for the current run.
#[derive(Debug, thiserror::Error)]
pub enum LedgerIoError {
    #[error("read ledger {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialize ledger: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("write ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that abort a run. The cursor is never advanced past unpersisted work.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    LedgerIo(#[from] LedgerIoError),
    #[error("misconfigured: {0}")]
    Misconfigured(String),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
