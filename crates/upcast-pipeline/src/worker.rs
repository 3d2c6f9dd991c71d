//! Validation-gated retry around the transformer
//!
//! Small items are sent whole. Each attempt is admitted by the shared rate
//! limiter, cleaned, and validated; a rejected candidate becomes the input of
//! the next attempt together with the rejection message. Large items, and
//! items the transformer refuses as too large, are split into chunks that
//! retry independently and are reassembled afterwards.

use crate::validate::Validator;
use std::path::Path;
use std::sync::Arc;
use upcast_ai::{RateLimiter, TransformError, Transformer, clean_response, is_placeholder};
use upcast_core::{
    Chunk, ChangeExtractor, Failure, FailureKind, LineChangeExtractor, PipelineConfig,
    ProcessingMode, ResultCache, TransformResult, WorkItem,
};
use upcast_indexer::{Chunker, FileType, strip_context};

const EMPTY_RESPONSE: &str = "Transformer returned an empty response";
const PLACEHOLDER_RESPONSE: &str = "Transformer returned a refusal or placeholder";

/// The capabilities a worker needs, shared by every task of a run.
#[derive(Clone)]
pub struct Services {
    pub transformer: Arc<dyn Transformer>,
    pub validator: Arc<dyn Validator>,
    pub changes: Arc<dyn ChangeExtractor>,
    pub cache: Option<Arc<ResultCache>>,
}

impl Services {
    pub fn new(transformer: Arc<dyn Transformer>, validator: Arc<dyn Validator>) -> Self {
        Self {
            transformer,
            validator,
            changes: Arc::new(LineChangeExtractor),
            cache: None,
        }
    }

    pub fn with_changes(mut self, changes: Arc<dyn ChangeExtractor>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("transformer", &self.transformer.name())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Outcome of one chunk's retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Done { output: String, attempts: u32 },
    Exhausted { error: String },
}

/// One attempt that produced no usable candidate.
enum Rejection {
    SizeLimit(String),
    Failed(FailureKind, String),
}

pub struct RetryingTransformWorker {
    services: Services,
    limiter: Arc<RateLimiter>,
    chunker: Chunker,
    max_attempts_whole: u32,
    max_attempts_chunk: u32,
    chunk_from_start_lines: usize,
    threshold: f64,
}

impl RetryingTransformWorker {
    pub fn new(services: Services, config: &PipelineConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            services,
            limiter,
            chunker: Chunker::new(config.chunk_max_lines),
            max_attempts_whole: config.max_attempts_whole,
            max_attempts_chunk: config.max_attempts_chunk,
            chunk_from_start_lines: config.chunk_from_start_lines,
            threshold: config.chunk_success_threshold,
        }
    }

    /// Process an item the way a run does: straight to chunks when it is large,
    /// otherwise whole first with a chunked retry on a size-limit failure.
    pub async fn process_item(&self, item: &WorkItem) -> TransformResult {
        let Some(content) = item.content() else {
            return missing(item);
        };
        if content.trim().is_empty() {
            tracing::debug!("{} is empty, nothing to transform", item.id);
            return TransformResult::succeeded(item.id.clone(), 0, content.to_string(), ProcessingMode::Whole);
        }

        if item.line_count() >= self.chunk_from_start_lines {
            tracing::info!("{} has {} lines, processing in chunks", item.id, item.line_count());
            return self
                .process_chunked(item, self.max_attempts_chunk, ProcessingMode::Chunked)
                .await;
        }

        let whole = self.process(item, self.max_attempts_whole).await;
        if !whole.is_size_limit() {
            return whole;
        }

        tracing::info!("{} exceeded the size limit, retrying in chunks", item.id);
        let mut chunked = self
            .process_chunked(item, self.max_attempts_chunk, ProcessingMode::Escalated)
            .await;
        chunked.attempts += whole.attempts;
        chunked
    }

    /// Whole-content retry loop.
    pub async fn process(&self, item: &WorkItem, max_attempts: u32) -> TransformResult {
        let Some(original) = item.content() else {
            return missing(item);
        };

        let mut current = original.to_string();
        let mut prior_error: Option<String> = None;
        let mut last = Failure::new(FailureKind::TransformFailure, "no attempts were made");

        for attempt in 1..=max_attempts {
            tracing::debug!("{}: attempt {}/{}", item.id, attempt, max_attempts);

            let candidate = match self.request(&item.path, &current, prior_error.as_deref()).await {
                Ok(candidate) => candidate,
                Err(Rejection::SizeLimit(message)) => {
                    tracing::warn!("{}: size limit exceeded on attempt {}", item.id, attempt);
                    return TransformResult::failed(
                        item.id.clone(),
                        attempt,
                        Failure::new(FailureKind::SizeLimitExceeded, message),
                        ProcessingMode::Whole,
                    );
                }
                Err(Rejection::Failed(kind, message)) => {
                    tracing::warn!("{}: attempt {} failed: {}", item.id, attempt, message);
                    prior_error = Some(message.clone());
                    last = Failure::new(kind, message);
                    continue;
                }
            };

            let validation = self.services.validator.validate(&item.path, &candidate).await;
            if validation.valid {
                tracing::debug!("{}: accepted on attempt {}", item.id, attempt);
                return self.accepted(item, original, candidate, attempt, ProcessingMode::Whole);
            }

            let message = validation.message();
            tracing::warn!("{}: attempt {} did not validate: {}", item.id, attempt, first_line(&message));
            current = candidate;
            prior_error = Some(message.clone());
            last = Failure::new(FailureKind::ValidationFailure, message);
        }

        TransformResult::failed(item.id.clone(), max_attempts, last, ProcessingMode::Whole)
    }

    /// Retry loop for one chunk. The chunk input never changes between
    /// attempts; only the error of the previous attempt is carried forward.
    pub async fn process_chunk(&self, path: &Path, chunk: &Chunk, max_attempts: u32) -> ChunkOutcome {
        let input = chunk.with_context();
        let mut prior_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            let candidate = match self.request(path, &input, prior_error.as_deref()).await {
                Ok(candidate) => candidate,
                Err(Rejection::SizeLimit(message)) | Err(Rejection::Failed(_, message)) => {
                    tracing::debug!("chunk {}: attempt {} failed: {}", chunk.name, attempt, message);
                    prior_error = Some(message);
                    continue;
                }
            };

            if chunk.is_standalone() {
                let validation = self.services.validator.validate_syntax_only(path, &candidate).await;
                if !validation.valid {
                    tracing::debug!("chunk {}: attempt {} did not parse", chunk.name, attempt);
                    prior_error = Some(validation.message());
                    continue;
                }
            }

            return ChunkOutcome::Done {
                output: strip_context(&candidate, &chunk.context),
                attempts: attempt,
            };
        }

        ChunkOutcome::Exhausted {
            error: prior_error.unwrap_or_else(|| "no attempts were made".to_string()),
        }
    }

    /// Chunked processing of a whole item.
    pub async fn process_chunked(
        &self,
        item: &WorkItem,
        max_attempts: u32,
        mode: ProcessingMode,
    ) -> TransformResult {
        let Some(original) = item.content() else {
            return missing(item);
        };

        let chunks = self.chunker.chunk(original, FileType::from_path(&item.path));
        let context = chunks.first().map(|c| c.context.clone()).unwrap_or_default();
        tracing::debug!("{}: {} chunks", item.id, chunks.len());

        let mut outputs = Vec::with_capacity(chunks.len());
        let mut failed_chunks = Vec::new();
        let mut attempts = 0;
        for chunk in &chunks {
            match self.process_chunk(&item.path, chunk, max_attempts).await {
                ChunkOutcome::Done { output, attempts: used } => {
                    attempts += used;
                    outputs.push(output);
                }
                ChunkOutcome::Exhausted { error } => {
                    tracing::warn!("{}: chunk {} failed: {}", item.id, chunk.name, first_line(&error));
                    attempts += max_attempts;
                    failed_chunks.push(chunk.name.clone());
                    outputs.push(chunk.content.clone());
                }
            }
        }

        let artifact = self.chunker.reassemble(&outputs, &context);
        let validation = self.services.validator.validate(&item.path, &artifact).await;
        let succeeded = chunks.len() - failed_chunks.len();
        let meets_threshold = chunks.is_empty()
            || succeeded as f64 / chunks.len() as f64 >= self.threshold - f64::EPSILON;

        let mut message = None;
        if !failed_chunks.is_empty() {
            message = Some(format!("Failed chunks: {}", failed_chunks.join(", ")));
        }
        if !validation.valid {
            let error = format!("Validation error: {}", validation.message());
            message = Some(match message {
                Some(chunks) => format!("{}; {}", chunks, error),
                None => error,
            });
        }

        let mut result = if validation.valid && meets_threshold {
            tracing::info!(
                "{}: {}/{} chunks transformed, reassembled output is valid",
                item.id,
                succeeded,
                chunks.len()
            );
            let mut result = self.accepted(item, original, artifact, attempts, mode);
            result.failure = message.map(|m| Failure::new(FailureKind::ChunkFailure, m));
            result
        } else {
            let kind = if failed_chunks.is_empty() {
                FailureKind::ValidationFailure
            } else {
                FailureKind::ChunkFailure
            };
            let message = message.unwrap_or_else(|| "Too few chunks succeeded".to_string());
            let mut result = TransformResult::failed(item.id.clone(), attempts, Failure::new(kind, message), mode);
            result.output = Some(artifact);
            result
        };
        result.failed_chunks = failed_chunks;
        result
    }

    /// One admitted transformer call, cleaned and screened for empty or
    /// placeholder answers.
    async fn request(&self, path: &Path, content: &str, prior_error: Option<&str>) -> Result<String, Rejection> {
        self.limiter.admit().await;
        let response = match self.services.transformer.transform(path, content, prior_error).await {
            Ok(response) => response,
            Err(TransformError::SizeLimit(message)) => return Err(Rejection::SizeLimit(message)),
            Err(e) => return Err(Rejection::Failed(FailureKind::TransformFailure, e.to_string())),
        };

        let candidate = clean_response(&response);
        if candidate.trim().is_empty() {
            return Err(Rejection::Failed(FailureKind::EmptyOrPlaceholderResponse, EMPTY_RESPONSE.to_string()));
        }
        if is_placeholder(&candidate) {
            return Err(Rejection::Failed(
                FailureKind::EmptyOrPlaceholderResponse,
                PLACEHOLDER_RESPONSE.to_string(),
            ));
        }
        Ok(with_trailing_newline(candidate))
    }

    fn accepted(
        &self,
        item: &WorkItem,
        original: &str,
        output: String,
        attempts: u32,
        mode: ProcessingMode,
    ) -> TransformResult {
        let name = item.id.as_str();
        let diff = self.services.changes.diff(original, &output, name);
        let changes = self.services.changes.extract_changes(original, &output);

        let mut result = TransformResult::succeeded(item.id.clone(), attempts, output, mode);
        result.changes = changes;
        result.diff = (!diff.is_empty()).then_some(diff);
        result
    }
}

fn missing(item: &WorkItem) -> TransformResult {
    TransformResult::failed(
        item.id.clone(),
        0,
        Failure::new(FailureKind::InputMissing, format!("cannot read {}", item.path.display())),
        ProcessingMode::Whole,
    )
}

fn with_trailing_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}
