//! Local provider for offline runs

use crate::bridge::{TransformError, Transformer};
use std::path::Path;

/// Returns its input unchanged. Used for dry runs that exercise discovery,
/// ordering, validation and caching without calling a service.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoProvider;

impl EchoProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Transformer for EchoProvider {
    async fn transform(
        &self,
        _path: &Path,
        content: &str,
        _prior_error: Option<&str>,
    ) -> Result<String, TransformError> {
        Ok(content.to_string())
    }

    fn name(&self) -> &str {
        "echo"
    }
}
