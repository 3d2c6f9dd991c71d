//! OpenAI-compatible chat completions provider (OpenAI, OpenRouter, local gateways)

use super::ProviderOptions;
use crate::bridge::{TransformError, Transformer};
use crate::prompt::{SYSTEM_PROMPT, build_prompt};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatibleProvider {
    /// `name` is used for logging; `api_key_env` is consulted when the options
    /// carry no key.
    pub fn new(name: &str, default_base_url: &str, api_key_env: &str, options: &ProviderOptions) -> Self {
        let api_key = options
            .api_key
            .clone()
            .or_else(|| std::env::var(api_key_env).ok())
            .unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("No API key for {} (set {})", name, api_key_env);
        }

        Self {
            client: reqwest::Client::new(),
            name: name.to_string(),
            base_url: options
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: options.model.clone(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

#[async_trait::async_trait]
impl Transformer for OpenAiCompatibleProvider {
    async fn transform(
        &self,
        path: &Path,
        content: &str,
        prior_error: Option<&str>,
    ) -> Result<String, TransformError> {
        if self.api_key.is_empty() {
            return Err(TransformError::Failed(format!("{} API key is not configured", self.name)));
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(path, content, prior_error),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-Title", "upcast")
            .json(&request)
            .send()
            .await
            .map_err(|e| TransformError::Failed(format!("Failed to send request to {}: {}", self.name, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TransformError::classify(format!(
                "{} API error ({}): {}",
                self.name, status, error_text
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| TransformError::Failed(format!("Failed to parse {} response: {}", self.name, e)))?;

        if let Some(usage) = &body.usage {
            tracing::debug!("{} used {} tokens for {}", self.name, usage.total_tokens, path.display());
        }

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| TransformError::Failed(format!("{} returned no choices", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
