//! Upcast Core: work items, the dependency graph, the result cache and diffing

pub mod model;
pub mod error;
pub mod config;
pub mod graph;
pub mod cache;
pub mod diff;


#[cfg(test)]
pub mod test_utils;

pub use model::{ItemId, WorkItem, Chunk, ChunkKind, TransformResult, Failure, ProcessingMode, content_hash};
pub use error::{FailureKind, PipelineError, CacheError};
pub use config::{PipelineConfig, RateLimitConfig};
pub use graph::{DependencyGraph, DependencyStats, CrossReferenceExtractor};
pub use cache::{CACHE_DIR, CacheEntry, CacheStats, ResultCache, cache_dir};
pub use diff::{ChangeExtractor, LineChangeExtractor, unified_diff};
