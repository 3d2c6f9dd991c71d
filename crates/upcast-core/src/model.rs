//! Core data structures for the transformation pipeline

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::FailureKind;

/// Stable identifier for a work item (its path relative to the run root).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        ItemId(id.into())
    }

    /// Derive an id from a path relative to `root`, always using `/` separators.
    pub fn from_path(root: &Path, path: &Path) -> Self {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        ItemId(parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        ItemId(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        ItemId(value)
    }
}

/// One unit of input content to be transformed, typically one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub id: ItemId,
    pub path: PathBuf,
    /// `None` when the file could not be read.
    content: Option<String>,
}

impl WorkItem {
    pub fn new(id: impl Into<ItemId>, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        WorkItem {
            id: id.into(),
            path: path.into(),
            content: Some(content.into()),
        }
    }

    /// An item whose source could not be read. It fails without consuming attempts.
    pub fn missing(id: impl Into<ItemId>, path: impl Into<PathBuf>) -> Self {
        WorkItem {
            id: id.into(),
            path: path.into(),
            content: None,
        }
    }

    /// Read an item from disk. Unreadable files become [`WorkItem::missing`].
    pub fn load(root: &Path, path: &Path) -> Self {
        let id = ItemId::from_path(root, path);
        match std::fs::read_to_string(path) {
            Ok(content) => WorkItem::new(id, path, content),
            Err(e) => {
                tracing::warn!("Cannot read {}: {}", path.display(), e);
                WorkItem::missing(id, path)
            }
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn line_count(&self) -> usize {
        self.content.as_deref().map_or(0, |c| c.lines().count())
    }

    /// SHA-256 of the content, hex encoded. Empty for missing items.
    pub fn content_hash(&self) -> String {
        self.content.as_deref().map(content_hash).unwrap_or_default()
    }
}

/// Hash used for cache invalidation. Stable across processes and platforms.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// How a chunk was carved out of its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkKind {
    /// A complete top-level declaration (or a run of top-level statements).
    Declaration,
    /// A fixed-size slice of a declaration that exceeded the line budget.
    Partial,
    /// A fixed-size slice produced when structural parsing failed.
    LineRange,
    /// The whole file, when it has no top-level declarations.
    WholeFile,
}

/// An independently retryable sub-unit of a work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub name: String,
    pub content: String,
    /// Import/context preamble shared by every chunk of the same item.
    pub context: String,
    /// 0-based first line.
    pub start_line: usize,
    /// 0-based, exclusive.
    pub end_line: usize,
}

impl Chunk {
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line
    }

    /// The text sent to the transformer: context first, then the body.
    pub fn with_context(&self) -> String {
        if self.context.is_empty() {
            self.content.clone()
        } else {
            format!("{}\n\n{}", self.context, self.content)
        }
    }

    /// Whether this chunk is expected to parse on its own.
    pub fn is_standalone(&self) -> bool {
        matches!(self.kind, ChunkKind::Declaration | ChunkKind::WholeFile)
    }
}

/// Which path through the worker produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingMode {
    Whole,
    Chunked,
    /// Whole-content processing hit a size limit and fell back to chunks.
    Escalated,
    Cached,
}

/// Why an item did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Failure {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Outcome of processing one work item. Exactly one per item per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult {
    pub item: ItemId,
    pub success: bool,
    pub attempts: u32,
    pub changes: Vec<String>,
    pub failure: Option<Failure>,
    pub diff: Option<String>,
    /// Accepted (or best-effort) output. Not serialized into reports.
    #[serde(skip)]
    pub output: Option<String>,
    pub from_cache: bool,
    pub failed_chunks: Vec<String>,
    pub mode: ProcessingMode,
    /// Where the best-effort output of a failed chunked run was saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_output: Option<PathBuf>,
}

impl TransformResult {
    pub fn succeeded(item: ItemId, attempts: u32, output: String, mode: ProcessingMode) -> Self {
        TransformResult {
            item,
            success: true,
            attempts,
            changes: Vec::new(),
            failure: None,
            diff: None,
            output: Some(output),
            from_cache: false,
            failed_chunks: Vec::new(),
            mode,
            partial_output: None,
        }
    }

    pub fn failed(item: ItemId, attempts: u32, failure: Failure, mode: ProcessingMode) -> Self {
        TransformResult {
            item,
            success: false,
            attempts,
            changes: Vec::new(),
            failure: Some(failure),
            diff: None,
            output: None,
            from_cache: false,
            failed_chunks: Vec::new(),
            mode,
            partial_output: None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }

    pub fn is_size_limit(&self) -> bool {
        self.failure_kind() == Some(FailureKind::SizeLimitExceeded)
    }
}
