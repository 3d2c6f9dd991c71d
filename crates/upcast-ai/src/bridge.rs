//! Transformation service boundary

use std::path::Path;

/// Substrings that mark a provider error as a context-size failure.
const SIZE_LIMIT_MARKERS: &[&str] = &["token", "context_length", "maximum context length"];

/// Failure reported by a [`Transformer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// The input was too large for the service. Retrying the same input is
    /// pointless; splitting it may help.
    #[error("Token limit exceeded: {0}")]
    SizeLimit(String),
    /// Anything else. Worth retrying.
    #[error("{0}")]
    Failed(String),
}

impl TransformError {
    /// Sort a raw provider error message into size-limit or generic failure.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if SIZE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker)) {
            TransformError::SizeLimit(message)
        } else {
            TransformError::Failed(message)
        }
    }

    pub fn is_size_limit(&self) -> bool {
        matches!(self, TransformError::SizeLimit(_))
    }
}

/// The external rewriting service. Implementations return the raw response;
/// callers clean and validate it.
#[async_trait::async_trait]
pub trait Transformer: Send + Sync {
    /// Rewrite `content`. `prior_error` carries the validation error of the
    /// previous attempt so the service can correct it.
    async fn transform(
        &self,
        path: &Path,
        content: &str,
        prior_error: Option<&str>,
    ) -> Result<String, TransformError>;

    /// Get provider name
    fn name(&self) -> &str;
}
