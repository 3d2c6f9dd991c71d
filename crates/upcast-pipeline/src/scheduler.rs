//! Level-by-level dispatch through a bounded worker pool
//!
//! Levels run strictly in ascending order: every item of level `k` has a
//! result before any item of level `k + 1` starts. Inside a level, items run
//! concurrently up to `pool_size`, in no particular order. The cache is
//! consulted before dispatch and updated after each item finishes.

use crate::progress::Progress;
use crate::worker::{RetryingTransformWorker, Services};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use upcast_ai::RateLimiter;
use upcast_core::{
    CacheStats, CrossReferenceExtractor, DependencyGraph, Failure, FailureKind, ItemId,
    PipelineConfig, PipelineError, ProcessingMode, TransformResult, WorkItem,
};

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOutcome {
    pub results: BTreeMap<ItemId, TransformResult>,
    pub cycles: Vec<Vec<ItemId>>,
    pub cache_stats: Option<CacheStats>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.values().filter(|r| !r.success).count()
    }

    pub fn from_cache(&self) -> usize {
        self.results.values().filter(|r| r.from_cache).count()
    }

    pub fn total_attempts(&self) -> u32 {
        self.results.values().map(|r| r.attempts).sum()
    }
}

pub struct Scheduler {
    config: PipelineConfig,
    services: Services,
    limiter: Arc<RateLimiter>,
    progress: Arc<Progress>,
}

impl Scheduler {
    pub fn new(config: PipelineConfig, services: Services) -> Result<Self, PipelineError> {
        config.validate()?;
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        Ok(Self {
            config,
            services,
            limiter,
            progress: Arc::new(Progress::new()),
        })
    }

    /// Replace the rate limiter, e.g. with one driven by a manual clock.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// Process `items` level by level. Items that appear in no level run last.
    pub async fn run(&self, items: Vec<WorkItem>, levels: Vec<Vec<ItemId>>) -> RunOutcome {
        let mut pending: HashMap<ItemId, WorkItem> =
            items.into_iter().map(|item| (item.id.clone(), item)).collect();
        self.progress.set_total(pending.len());

        let mut ordered: Vec<Vec<WorkItem>> = levels
            .into_iter()
            .map(|level| level.iter().filter_map(|id| pending.remove(id)).collect())
            .collect();
        if !pending.is_empty() {
            let mut rest: Vec<WorkItem> = pending.into_values().collect();
            rest.sort_by(|a, b| a.id.cmp(&b.id));
            ordered.push(rest);
        }

        let worker = Arc::new(RetryingTransformWorker::new(
            self.services.clone(),
            &self.config,
            self.limiter.clone(),
        ));
        let mut results = BTreeMap::new();

        for (index, level) in ordered.into_iter().enumerate() {
            if level.is_empty() {
                continue;
            }
            tracing::info!("Level {}: {} items", index, level.len());
            for result in self.run_level(&worker, level).await {
                results.insert(result.item.clone(), result);
            }
            let snapshot = self.progress.snapshot();
            tracing::info!(
                "Progress: {}/{} ({} failed, {} cached)",
                snapshot.completed,
                snapshot.total,
                snapshot.failed,
                snapshot.cached
            );
        }

        RunOutcome {
            results,
            cycles: Vec::new(),
            cache_stats: self.services.cache.as_ref().map(|cache| cache.stats()),
        }
    }

    async fn run_level(&self, worker: &Arc<RetryingTransformWorker>, level: Vec<WorkItem>) -> Vec<TransformResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.pool_size));
        let mut results = Vec::with_capacity(level.len());
        let mut tasks = Vec::new();
        let mut dispatched = Vec::new();

        for item in level {
            if let Some(result) = self.cached_result(&item) {
                tracing::debug!("{}: cache hit", item.id);
                self.progress.record(&result);
                results.push(result);
                continue;
            }

            dispatched.push(item.id.clone());
            let worker = worker.clone();
            let semaphore = semaphore.clone();
            let services = self.services.clone();
            let progress = self.progress.clone();
            let use_cache = self.config.use_cache;
            let write_outputs = self.config.write_outputs;

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let mut result = worker.process_item(&item).await;

                if let Some(cache) = services.cache.as_ref().filter(|_| use_cache) {
                    if let Err(e) = cache.record(&item, &result, result.output.as_deref()) {
                        tracing::warn!("{}: could not record result in cache: {}", item.id, e);
                    }
                }
                if write_outputs {
                    if result.success {
                        write_output(&item, &result).await;
                        discard_partial(&item).await;
                    } else {
                        result.partial_output = write_partial(&item, &result).await;
                    }
                }

                progress.record(&result);
                result
            }));
        }

        for (id, joined) in dispatched.into_iter().zip(join_all(tasks).await) {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!("{}: worker task failed: {}", id, e);
                    let result = TransformResult::failed(
                        id,
                        0,
                        Failure::new(FailureKind::TransformFailure, format!("worker task failed: {}", e)),
                        ProcessingMode::Whole,
                    );
                    self.progress.record(&result);
                    results.push(result);
                }
            }
        }
        results
    }

    fn cached_result(&self, item: &WorkItem) -> Option<TransformResult> {
        if !self.config.use_cache {
            return None;
        }
        let cache = self.services.cache.as_ref()?;
        if !cache.is_hit(item) {
            return None;
        }
        let entry = cache.entry(&item.id)?;

        let mut result = TransformResult::succeeded(
            item.id.clone(),
            entry.attempts,
            cache.load_output(&item.id).unwrap_or_default(),
            ProcessingMode::Cached,
        );
        result.changes = entry.changes;
        result.from_cache = true;
        if self.config.write_outputs && !cache.restore(item, &item.path) {
            tracing::warn!("{}: cached output could not be restored", item.id);
        }
        Some(result)
    }
}

async fn write_output(item: &WorkItem, result: &TransformResult) {
    let Some(output) = result.output.as_deref() else {
        return;
    };
    if item.content() == Some(output) {
        return;
    }
    match tokio::fs::write(&item.path, output).await {
        Ok(()) => tracing::debug!("{}: output written", item.id),
        Err(e) => tracing::warn!("{}: could not write output to {}: {}", item.id, item.path.display(), e),
    }
}

/// Sibling file that receives the best-effort output of a failed item, so the
/// source itself is only ever overwritten by accepted output.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

async fn write_partial(item: &WorkItem, result: &TransformResult) -> Option<PathBuf> {
    let output = result.output.as_deref()?;
    let path = partial_path(&item.path);
    match tokio::fs::write(&path, output).await {
        Ok(()) => {
            tracing::info!("{}: best-effort output saved to {}", item.id, path.display());
            Some(path)
        }
        Err(e) => {
            tracing::warn!("{}: could not save best-effort output to {}: {}", item.id, path.display(), e);
            None
        }
    }
}

async fn discard_partial(item: &WorkItem) {
    let path = partial_path(&item.path);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => tracing::debug!("{}: removed stale {}", item.id, path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("{}: could not remove {}: {}", item.id, path.display(), e),
    }
}

/// Build the dependency graph for `items`, then process them level by level.
///
/// Duplicate item ids keep their first occurrence. Cycles are reported in the
/// outcome and never stop the run.
pub async fn run_pipeline(
    items: Vec<WorkItem>,
    references: &dyn CrossReferenceExtractor,
    config: PipelineConfig,
    services: Services,
) -> Result<RunOutcome, PipelineError> {
    let scheduler = Scheduler::new(config, services)?;
    scheduler.run_items(items, references).await
}

impl Scheduler {
    /// [`run_pipeline`] on an existing scheduler, so callers can poll
    /// [`Scheduler::progress`] while it runs.
    pub async fn run_items(
        &self,
        items: Vec<WorkItem>,
        references: &dyn CrossReferenceExtractor,
    ) -> Result<RunOutcome, PipelineError> {
        let items = dedupe(items);
        let graph = DependencyGraph::build(&items, references.extract(&items));
        let stats = graph.stats();
        tracing::info!(
            "Dependency graph: {} items, {} dependencies",
            stats.items,
            stats.dependencies
        );

        let cycles = graph.detect_cycles();
        let levels = if self.config.respect_dependencies {
            graph.level_groups()
        } else {
            let mut all: Vec<ItemId> = items.iter().map(|item| item.id.clone()).collect();
            all.sort();
            vec![all]
        };

        let mut outcome = self.run(items, levels).await;
        outcome.cycles = cycles;
        Ok(outcome)
    }
}

fn dedupe(items: Vec<WorkItem>) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(item.id.clone());
            if !fresh {
                tracing::warn!("Duplicate work item {}, keeping the first", item.id);
            }
            fresh
        })
        .collect()
}
