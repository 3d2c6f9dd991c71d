//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PipelineError;

/// Sliding-window rate limit for transformer calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum calls admitted in any window.
    pub max_calls: u32,
    /// Window width in seconds.
    pub window_secs: f64,
}

impl RateLimitConfig {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window_secs: window.as_secs_f64(),
        }
    }

    /// Window width. Out-of-range values saturate; `validate` rejects them.
    pub fn window(&self) -> Duration {
        Duration::try_from_secs_f64(self.window_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 10,
            window_secs: 60.0,
        }
    }
}

/// Everything the pipeline entry point needs to know about a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Attempts for whole-content processing of one item.
    pub max_attempts_whole: u32,
    /// Attempts for each chunk in chunked mode.
    pub max_attempts_chunk: u32,
    /// Concurrent items per level.
    pub pool_size: usize,
    pub rate_limit: RateLimitConfig,
    /// Line budget of one chunk.
    pub chunk_max_lines: usize,
    /// Items at or above this many lines skip whole-content processing.
    pub chunk_from_start_lines: usize,
    /// Minimum fraction of chunks that must succeed for a chunked item to pass.
    pub chunk_success_threshold: f64,
    pub use_cache: bool,
    /// When false every item lands in a single level.
    pub respect_dependencies: bool,
    /// Write accepted outputs back over each item's path.
    pub write_outputs: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts_whole: 5,
            max_attempts_chunk: 3,
            pool_size: 5,
            rate_limit: RateLimitConfig::default(),
            chunk_max_lines: 300,
            chunk_from_start_lines: 3000,
            chunk_success_threshold: 0.8,
            use_cache: true,
            respect_dependencies: true,
            write_outputs: true,
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would stall or never succeed.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));

        if self.max_attempts_whole == 0 || self.max_attempts_chunk == 0 {
            return invalid("attempt limits must be at least 1");
        }
        if self.pool_size == 0 {
            return invalid("pool_size must be at least 1");
        }
        if self.rate_limit.max_calls == 0 {
            return invalid("rate_limit.max_calls must be at least 1");
        }
        if Duration::try_from_secs_f64(self.rate_limit.window_secs).is_err() {
            return invalid("rate_limit.window_secs must be a non-negative number of seconds in range");
        }
        if self.chunk_max_lines == 0 {
            return invalid("chunk_max_lines must be at least 1");
        }
        if !(self.chunk_success_threshold > 0.0 && self.chunk_success_threshold <= 1.0) {
            return invalid("chunk_success_threshold must be in (0, 1]");
        }
        Ok(())
    }
}
