//! Persistent result cache keyed by item id and input content hash
//!
//! Layout under the run root:
//!
//! ```text
//! .upcast/
//!   results.jsonl      one CacheEntry per line, appended; last line per key wins
//!   outputs/<hash>.out accepted outputs referenced from their entry
//! ```

use crate::error::CacheError;
use crate::model::{ItemId, TransformResult, WorkItem, content_hash};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Cache directory: .upcast/
pub const CACHE_DIR: &str = ".upcast";

/// Record log inside the cache directory
pub const RESULTS_LOG: &str = "results.jsonl";

/// Directory holding accepted outputs
pub const OUTPUTS_DIR: &str = "outputs";

/// Get cache directory path
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// One cached outcome for an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: ItemId,
    pub input_hash: String,
    pub success: bool,
    pub attempts: u32,
    pub timestamp: String,
    pub error: Option<String>,
    #[serde(default)]
    pub changes: Vec<String>,
    /// Stored output, relative to the cache directory. Only set on success.
    pub output: Option<PathBuf>,
    /// Hash of the stored output. An item whose content already equals its
    /// accepted output is also a hit.
    #[serde(default)]
    pub output_hash: Option<String>,
}

impl CacheEntry {
    /// Whether `hash` is the hash of this entry's accepted output.
    pub fn is_applied(&self, hash: &str) -> bool {
        self.output_hash.as_deref() == Some(hash)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

struct CacheState {
    entries: HashMap<ItemId, CacheEntry>,
    /// Opened lazily so a cleared cache leaves nothing on disk until the next record.
    log: Option<File>,
}

/// Append-only, mutex-guarded result store shared by all workers.
pub struct ResultCache {
    dir: PathBuf,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache").field("dir", &self.dir).finish()
    }
}

impl ResultCache {
    /// Open the cache for a run root. A missing or unreadable store is an
    /// empty cache.
    pub fn open(root: &Path) -> Self {
        Self::open_dir(cache_dir(root))
    }

    /// Open a cache rooted at an explicit directory.
    pub fn open_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let (entries, stale_lines) = load_entries(&dir.join(RESULTS_LOG));
        let cache = ResultCache {
            dir,
            state: Mutex::new(CacheState { entries, log: None }),
        };

        let live = cache.lock().entries.len();
        if stale_lines > live {
            if let Err(e) = cache.compact() {
                tracing::warn!("Cache compaction failed: {}", e);
            }
        }
        tracing::debug!("Opened cache at {} with {} entries", cache.dir.display(), live);
        cache
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // A poisoned lock only means another worker panicked mid-record; the
        // map itself is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True if the item was transformed successfully before and its content
    /// is unchanged since, or already holds the accepted output.
    pub fn is_hit(&self, item: &WorkItem) -> bool {
        let Some(current) = item.content().map(content_hash) else {
            return false;
        };
        let state = self.lock();
        match state.entries.get(&item.id) {
            Some(entry) if entry.input_hash != current && !entry.is_applied(&current) => {
                tracing::debug!("{} changed since cached, reprocessing", item.id);
                false
            }
            Some(entry) => entry.success,
            None => false,
        }
    }

    /// Get the cached entry for an item, if any.
    pub fn entry(&self, id: &ItemId) -> Option<CacheEntry> {
        self.lock().entries.get(id).cloned()
    }

    /// Record the latest outcome for an item, replacing any earlier entry.
    /// The output is stored only when the result succeeded.
    pub fn record(
        &self,
        item: &WorkItem,
        result: &TransformResult,
        output: Option<&str>,
    ) -> Result<(), CacheError> {
        let (output_ref, output_hash) = match output {
            Some(body) if result.success => {
                (Some(self.store_output(&item.id, body)?), Some(content_hash(body)))
            }
            _ => (None, None),
        };

        let entry = CacheEntry {
            key: item.id.clone(),
            input_hash: item.content_hash(),
            success: result.success,
            attempts: result.attempts,
            timestamp: chrono::Utc::now().to_rfc3339(),
            error: result.error_message().map(str::to_string),
            changes: result.changes.clone(),
            output: output_ref,
            output_hash,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut state = self.lock();
        if state.log.is_none() {
            state.log = Some(self.open_log()?);
        }
        if let Some(log) = state.log.as_mut() {
            let path = self.dir.join(RESULTS_LOG);
            log.write_all(line.as_bytes())
                .and_then(|_| log.flush())
                .map_err(|e| CacheError::io(&path, e))?;
        }
        state.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Read the stored output for an item, if it has one.
    pub fn load_output(&self, id: &ItemId) -> Option<String> {
        let relative = self.lock().entries.get(id)?.output.clone()?;
        let path = self.dir.join(relative);
        match std::fs::read_to_string(&path) {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!("Cached output {} unreadable: {}", path.display(), e);
                None
            }
        }
    }

    /// Copy the stored output for an item over `destination`. Succeeds without
    /// writing when the item already holds that output.
    pub fn restore(&self, item: &WorkItem, destination: &Path) -> bool {
        let applied = self
            .entry(&item.id)
            .is_some_and(|entry| entry.success && entry.is_applied(&item.content_hash()));
        if applied && destination == item.path {
            return true;
        }
        let Some(body) = self.load_output(&item.id) else {
            return false;
        };
        match std::fs::write(destination, body) {
            Ok(()) => {
                tracing::debug!("Restored {} from cache", item.id);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to restore {} from cache: {}", item.id, e);
                false
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let total = state.entries.len();
        let successful = state.entries.values().filter(|e| e.success).count();
        CacheStats {
            total,
            successful,
            failed: total - successful,
        }
    }

    /// Drop every entry and remove the cache directory.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.lock();
        state.log = None;
        state.entries.clear();
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        }
        tracing::info!("Cache cleared");
        Ok(())
    }

    /// Rewrite the log with one line per live entry.
    pub fn compact(&self) -> Result<(), CacheError> {
        let mut state = self.lock();
        let path = self.dir.join(RESULTS_LOG);
        let tmp = self.dir.join(format!("{}.tmp", RESULTS_LOG));

        let mut keys: Vec<&ItemId> = state.entries.keys().collect();
        keys.sort();
        let mut body = String::new();
        for key in keys {
            body.push_str(&serde_json::to_string(&state.entries[key])?);
            body.push('\n');
        }

        std::fs::write(&tmp, body).map_err(|e| CacheError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| CacheError::io(&path, e))?;
        state.log = None;
        tracing::debug!("Compacted cache log to {} entries", state.entries.len());
        Ok(())
    }

    fn open_log(&self) -> Result<File, CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        let path = self.dir.join(RESULTS_LOG);
        let torn = ends_mid_line(&path);
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CacheError::io(&path, e))?;
        // Terminate a record cut off by a crash so the next one starts on its own line
        if torn {
            log.write_all(b"\n").map_err(|e| CacheError::io(&path, e))?;
        }
        Ok(log)
    }

    fn store_output(&self, id: &ItemId, body: &str) -> Result<PathBuf, CacheError> {
        let outputs = self.dir.join(OUTPUTS_DIR);
        std::fs::create_dir_all(&outputs).map_err(|e| CacheError::io(&outputs, e))?;
        let relative = Path::new(OUTPUTS_DIR).join(format!("{}.out", &content_hash(id.as_str())[..16]));
        let path = self.dir.join(&relative);
        std::fs::write(&path, body).map_err(|e| CacheError::io(&path, e))?;
        Ok(relative)
    }
}

/// Read the record log. Returns the live entries and the number of lines that
/// were superseded or unreadable. A torn or undecodable line is skipped like
/// any other corrupt record; the lines around it still load.
fn load_entries(path: &Path) -> (HashMap<ItemId, CacheEntry>, usize) {
    let mut entries = HashMap::new();
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return (entries, 0),
        Err(e) => {
            tracing::warn!("Could not load cache {}: {}", path.display(), e);
            return (entries, 0);
        }
    };

    let mut lines = 0usize;
    for (number, raw) in bytes.split(|&b| b == b'\n').enumerate() {
        let Ok(line) = std::str::from_utf8(raw) else {
            tracing::warn!("Skipping undecodable cache record on line {}", number + 1);
            lines += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        lines += 1;
        match serde_json::from_str::<CacheEntry>(line) {
            Ok(entry) => {
                entries.insert(entry.key.clone(), entry);
            }
            Err(e) => tracing::warn!("Skipping corrupt cache record on line {}: {}", number + 1, e),
        }
    }

    let live = entries.len();
    (entries, lines.saturating_sub(live))
}

/// True if the file exists, is non-empty and its last byte is not a newline.
fn ends_mid_line(path: &Path) -> bool {
    std::fs::read(path).is_ok_and(|bytes| bytes.last().is_some_and(|&b| b != b'\n'))
}
