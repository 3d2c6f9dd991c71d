//! Transformation service access for upcast
//!
//! This crate wraps the external rewriting service: the [`Transformer`]
//! capability and its error taxonomy, prompt building and response
//! cleaning, concrete providers, and the shared sliding-window
//! [`RateLimiter`] that gates every call.

pub mod bridge;
pub mod prompt;
pub mod providers;
pub mod rate_limit;


pub use bridge::{TransformError, Transformer};
pub use prompt::{build_prompt, clean_response, is_placeholder};
pub use providers::{ProviderOptions, create_transformer};
pub use rate_limit::{Clock, ManualClock, RateLimiter, SystemClock};
