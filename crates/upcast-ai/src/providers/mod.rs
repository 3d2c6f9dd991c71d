//! Transformer implementations

pub mod openai;
pub mod local;

use crate::bridge::Transformer;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Provider settings, loadable from the `[provider]` table of `upcast.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    /// One of `openrouter`, `openai`, `echo`.
    pub name: String,
    pub model: String,
    /// Falls back to the provider's environment variable.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            name: "openrouter".to_string(),
            model: "openai/gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.1,
            max_tokens: 16_000,
        }
    }
}

/// Factory function to create transformers
pub fn create_transformer(options: &ProviderOptions) -> Result<Arc<dyn Transformer>> {
    match options.name.as_str() {
        "openrouter" => Ok(Arc::new(openai::OpenAiCompatibleProvider::new(
            "openrouter",
            openai::OPENROUTER_BASE_URL,
            "OPENROUTER_API_KEY",
            options,
        ))),
        "openai" => Ok(Arc::new(openai::OpenAiCompatibleProvider::new(
            "openai",
            openai::OPENAI_BASE_URL,
            "OPENAI_API_KEY",
            options,
        ))),
        "echo" | "local" => Ok(Arc::new(local::EchoProvider::new())),
        other => anyhow::bail!("Unknown transformer provider: {}", other),
    }
}
