use std::path::PathBuf;

use thiserror::Error;

/// Why a prediction request was not answered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PredictError {
    /// The caller sent something other than non-empty text.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The loaded vocabulary, model and label encoder disagree in size.
    #[error("artifact mismatch: expected {expected}, got {got}")]
    ArtifactMismatch {
        /// Size the model or encoder expects.
        expected: usize,
        /// Size actually produced.
        got: usize,
    },
    /// The loaded model cannot score inputs.
    #[error("corrupt artifact: {0}")]
    CorruptArtifact(String),
}

impl PredictError {
    /// Whether the caller is at fault.
    #[must_use]
    pub const fn is_bad_request(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

/// Failure to append an audit line.
#[derive(Debug, Error)]
pub enum AuditWriteError {
    /// Filesystem I/O error.
    #[error("audit write to {path} failed: {source}")]
    Io {
        /// Audit log path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The sink refuses writes.
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}
