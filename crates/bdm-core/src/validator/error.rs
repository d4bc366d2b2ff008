//! Validation I/O errors (distinct from a missing asset).

use std::path::PathBuf;

/// The folder or one of its files could not be inspected for a reason other
/// than absence. Callers treat this as a failed validation attempt.
#[derive(Debug, thiserror::Error)]
pub enum ValidationIoError {
    #[error("inspect {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} exists but is not a directory")]
    NotADirectory { path: PathBuf },
}
