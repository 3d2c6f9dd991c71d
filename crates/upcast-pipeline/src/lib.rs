//! Upcast Pipeline: validation, the retrying worker and level scheduling
//!
//! [`run_pipeline`] is the entry point: it orders work items by their
//! dependencies, skips items the cache already holds, and drives the rest
//! through [`RetryingTransformWorker`] under a shared rate limit.

pub mod validate;
pub mod worker;
pub mod progress;
pub mod scheduler;


pub use validate::{CommandValidator, SyntaxValidator, Validation, Validator, ValidatorError};
pub use worker::{ChunkOutcome, RetryingTransformWorker, Services};
pub use progress::{Progress, ProgressSnapshot};
pub use scheduler::{RunOutcome, Scheduler, partial_path, run_pipeline};
