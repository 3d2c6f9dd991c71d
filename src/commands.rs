//! CLI command implementations

use crate::config::AppConfig;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use upcast_ai::create_transformer;
use upcast_core::{CACHE_DIR, CrossReferenceExtractor, DependencyGraph, ResultCache, WorkItem};
use upcast_indexer::{PythonReferences, discover_sources};
use upcast_pipeline::{CommandValidator, RunOutcome, Scheduler, Services, SyntaxValidator, Validator};

/// Flags of the `run` command that override the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub output: Option<PathBuf>,
    pub no_cache: bool,
    pub sequential: bool,
    pub ignore_deps: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub check_command: Option<String>,
    pub json_report: Option<PathBuf>,
}

impl RunOptions {
    fn apply(&self, config: &mut AppConfig) {
        if self.no_cache {
            config.pipeline.use_cache = false;
        }
        if self.sequential {
            config.pipeline.pool_size = 1;
        }
        if self.ignore_deps {
            config.pipeline.respect_dependencies = false;
        }
        if let Some(provider) = &self.provider {
            config.provider.name = provider.clone();
        }
        if let Some(model) = &self.model {
            config.provider.model = model.clone();
        }
        if let Some(command) = &self.check_command {
            config.check_command = Some(command.clone());
        }
    }
}

pub async fn run(root: PathBuf, options: RunOptions) -> anyhow::Result<()> {
    let mut config = AppConfig::load(&root)?;
    options.apply(&mut config);

    let root = match &options.output {
        Some(output) => {
            tracing::info!("Copying {} to {}", root.display(), output.display());
            copy_tree(&root, output)?;
            output.clone()
        }
        None => root,
    };

    let items = load_items(&root, &config)?;
    tracing::info!("Found {} source files under {}", items.len(), root.display());

    let transformer = create_transformer(&config.provider)?;
    let validator: Arc<dyn Validator> = match config.check_command.as_deref() {
        Some(command) => Arc::new(CommandValidator::new(command)?),
        None => Arc::new(SyntaxValidator),
    };
    tracing::info!("Transformer: {} ({})", transformer.name(), config.provider.model);

    let mut services = Services::new(transformer, validator);
    if config.pipeline.use_cache {
        let cache = Arc::new(ResultCache::open(&root));
        let stats = cache.stats();
        if stats.total > 0 {
            tracing::info!("Found cache: {} successful, {} failed", stats.successful, stats.failed);
        }
        services = services.with_cache(cache);
    }

    let scheduler = Scheduler::new(config.pipeline.clone(), services)?;
    let progress = scheduler.progress();
    let reporter = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let snapshot = progress.snapshot();
            tracing::info!(
                "{}/{} items done ({:.0}%), {} failed",
                snapshot.completed,
                snapshot.total,
                snapshot.percent(),
                snapshot.failed
            );
        }
    });

    let outcome = scheduler.run_items(items, &PythonReferences).await;
    reporter.abort();
    let outcome = outcome?;

    print_summary(&outcome);
    if let Some(path) = &options.json_report {
        let body = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(path, body).with_context(|| format!("writing report {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
    }
    Ok(())
}

pub fn graph(root: PathBuf) -> anyhow::Result<()> {
    let config = AppConfig::load(&root)?;
    let items = load_items(&root, &config)?;
    let graph = DependencyGraph::build(&items, PythonReferences.extract(&items));

    let stats = graph.stats();
    println!(
        "{} files, {} dependencies, {} files with dependencies",
        stats.items, stats.dependencies, stats.items_with_dependencies
    );
    for (level, ids) in graph.level_groups().iter().enumerate() {
        println!("Level {}:", level);
        for id in ids {
            println!("  {}", id);
        }
    }

    let cycles = graph.detect_cycles();
    if !cycles.is_empty() {
        println!("Cycles:");
        for cycle in cycles {
            let names: Vec<&str> = cycle.iter().map(|id| id.as_str()).collect();
            println!("  {}", names.join(" -> "));
        }
    }
    Ok(())
}

pub fn stats(root: PathBuf) -> anyhow::Result<()> {
    let cache = ResultCache::open(&root);
    let stats = cache.stats();
    println!("Cache: {}", cache.dir().display());
    println!("  total:      {}", stats.total);
    println!("  successful: {}", stats.successful);
    println!("  failed:     {}", stats.failed);
    Ok(())
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    tracing::info!("Clearing cache for: {}", root.display());
    ResultCache::open(&root).clear()?;
    Ok(())
}

fn load_items(root: &Path, config: &AppConfig) -> anyhow::Result<Vec<WorkItem>> {
    let paths = discover_sources(root, &config.discovery.patterns, &config.discovery.excludes)?;
    Ok(paths.iter().map(|path| WorkItem::load(root, path)).collect())
}

/// Copy every file under `from` into `to`, skipping VCS metadata and the cache.
fn copy_tree(from: &Path, to: &Path) -> anyhow::Result<()> {
    let from = from.canonicalize().with_context(|| format!("reading {}", from.display()))?;
    std::fs::create_dir_all(to).with_context(|| format!("creating {}", to.display()))?;
    let to = to.canonicalize()?;

    let walker = ignore::WalkBuilder::new(&from)
        .standard_filters(false)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            name != ".git" && name != CACHE_DIR
        })
        .build();

    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        if path.starts_with(&to) {
            continue;
        }
        let relative = path.strip_prefix(&from)?;
        let target = to.join(relative);
        if entry.file_type().is_some_and(|t| t.is_dir()) {
            std::fs::create_dir_all(&target).with_context(|| format!("creating {}", target.display()))?;
        } else if entry.file_type().is_some_and(|t| t.is_file()) {
            std::fs::copy(path, &target).with_context(|| format!("copying {}", path.display()))?;
        }
    }
    Ok(())
}

fn print_summary(outcome: &RunOutcome) {
    println!();
    println!("Processed {} files", outcome.results.len());
    println!("  succeeded:  {}", outcome.succeeded());
    println!("  failed:     {}", outcome.failed());
    println!("  from cache: {}", outcome.from_cache());
    println!("  attempts:   {}", outcome.total_attempts());

    let failures: Vec<_> = outcome.results.values().filter(|r| !r.success).collect();
    if !failures.is_empty() {
        println!();
        println!("Failures:");
        for result in failures {
            let message = result.error_message().unwrap_or("unknown error");
            println!("  {}: {}", result.item, message.lines().next().unwrap_or(message));
            if let Some(partial) = &result.partial_output {
                println!("    best-effort output: {}", partial.display());
            }
        }
    }
    for cycle in &outcome.cycles {
        let names: Vec<&str> = cycle.iter().map(|id| id.as_str()).collect();
        println!("Dependency cycle: {}", names.join(" -> "));
    }
}
