//! Error taxonomy

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Classification of a per-item failure. Always captured as data, never
/// propagated past the item that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The item could not be read. No attempts were consumed.
    InputMissing,
    /// The transformer answered with nothing usable.
    EmptyOrPlaceholderResponse,
    /// The candidate output did not validate.
    ValidationFailure,
    /// The transformer rejected the input as too large.
    SizeLimitExceeded,
    /// Chunked processing finished but too many chunks failed or the
    /// reassembled output did not validate.
    ChunkFailure,
    /// Any other transformer error, or a worker task that died.
    TransformFailure,
}

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by the persistent result cache.
///
/// Corruption is not represented here: an unreadable store is treated as
/// empty and only logged.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode cache record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
