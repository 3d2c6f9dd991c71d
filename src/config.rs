//! Run configuration: `upcast.toml`, then `UPCAST_*` environment overrides

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use upcast_ai::ProviderOptions;
use upcast_core::PipelineConfig;

pub const CONFIG_FILE: &str = "upcast.toml";

/// Which files of the root become work items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub patterns: Vec<String>,
    pub excludes: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["**/*.py".to_string()],
            excludes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub provider: ProviderOptions,
    pub discovery: DiscoveryConfig,
    /// External command run against every candidate after the syntax check.
    pub check_command: Option<String>,
}

impl AppConfig {
    /// Load `upcast.toml` under `root` if present, then `.env`, then the
    /// process environment.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let path = root.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig = toml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            tracing::debug!("Loaded {}", path.display());
            config
        } else {
            AppConfig::default()
        };

        if let Err(e) = dotenvy::from_path(root.join(".env")) {
            if !e.not_found() {
                tracing::warn!("Ignoring .env: {}", e);
            }
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `UPCAST_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> anyhow::Result<T>
        where
            T::Err: std::fmt::Display,
        {
            value
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{}={:?}: {}", key, value, e))
        }

        if let Some(value) = lookup("UPCAST_MAX_RETRIES") {
            self.pipeline.max_attempts_whole = parse("UPCAST_MAX_RETRIES", value)?;
        }
        if let Some(value) = lookup("UPCAST_MAX_RETRIES_CHUNK") {
            self.pipeline.max_attempts_chunk = parse("UPCAST_MAX_RETRIES_CHUNK", value)?;
        }
        // Calls per minute
        if let Some(value) = lookup("UPCAST_RATE_LIMIT") {
            self.pipeline.rate_limit.max_calls = parse("UPCAST_RATE_LIMIT", value)?;
            self.pipeline.rate_limit.window_secs = 60.0;
        }
        if let Some(value) = lookup("UPCAST_POOL_SIZE") {
            self.pipeline.pool_size = parse("UPCAST_POOL_SIZE", value)?;
        }
        if let Some(value) = lookup("UPCAST_MODEL") {
            self.provider.model = value;
        }
        Ok(())
    }
}
