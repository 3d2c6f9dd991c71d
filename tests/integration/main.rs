//! Integration tests for Upcast
//!
//! These tests drive a small Python repository through discovery, dependency
//! ordering, transformation, validation and caching.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use upcast_ai::{TransformError, Transformer};
use upcast_core::{ItemId, PipelineConfig, ProcessingMode, RateLimitConfig, ResultCache, WorkItem};
use upcast_indexer::{PythonReferences, discover_sources};
use upcast_pipeline::{Services, SyntaxValidator, run_pipeline};

/// Rewrites the deprecated call and records which files it saw.
#[derive(Default)]
struct ArrayUpgrader {
    seen: Mutex<Vec<PathBuf>>,
}

impl ArrayUpgrader {
    fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }

    fn position(&self, name: &str) -> usize {
        self.seen()
            .iter()
            .position(|p| p.ends_with(name))
            .unwrap_or_else(|| panic!("{} was never transformed", name))
    }
}

#[async_trait::async_trait]
impl Transformer for ArrayUpgrader {
    async fn transform(&self, path: &Path, content: &str, _prior_error: Option<&str>) -> Result<String, TransformError> {
        self.seen.lock().unwrap().push(path.to_path_buf());
        Ok(format!("```python\n{}\n```", content.replace("np.array(", "np.asarray(")))
    }

    fn name(&self) -> &str {
        "array-upgrader"
    }
}

fn create_repo() -> TempDir {
    let dir = tempfile::Builder::new().prefix("upcast").tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("pkg/__pycache__")).unwrap();

    fs::write(root.join("pkg/__init__.py"), "").unwrap();
    fs::write(
        root.join("pkg/util.py"),
        "import numpy as np\n\n\ndef scale(values):\n    return np.array(values) * 2\n",
    )
    .unwrap();
    fs::write(
        root.join("pkg/model.py"),
        "from pkg.util import scale\n\n\nclass Model:\n    def fit(self, data):\n        return scale(data)\n",
    )
    .unwrap();
    fs::write(
        root.join("main.py"),
        "from pkg.model import Model\n\nif __name__ == \"__main__\":\n    Model().fit([1, 2, 3])\n",
    )
    .unwrap();
    fs::write(root.join("pkg/__pycache__/util.cpython-312.py"), "junk(").unwrap();
    fs::write(root.join("README.md"), "# demo\n").unwrap();
    dir
}

fn load(root: &Path) -> Vec<WorkItem> {
    let patterns = vec!["**/*.py".to_string()];
    discover_sources(root, &patterns, &[])
        .unwrap()
        .iter()
        .map(|path| WorkItem::load(root, path))
        .collect()
}

fn config() -> PipelineConfig {
    PipelineConfig {
        rate_limit: RateLimitConfig::new(100, Duration::from_secs(1)),
        ..Default::default()
    }
}

#[test]
fn test_discovery_skips_caches_and_other_files() {
    let repo = create_repo();
    let ids: Vec<ItemId> = load(repo.path()).into_iter().map(|item| item.id).collect();
    assert_eq!(
        ids,
        vec![
            ItemId::from("main.py"),
            ItemId::from("pkg/__init__.py"),
            ItemId::from("pkg/model.py"),
            ItemId::from("pkg/util.py"),
        ]
    );
}

#[tokio::test]
async fn test_repository_upgrade_end_to_end() {
    let repo = create_repo();
    let root = repo.path();
    let upgrader = Arc::new(ArrayUpgrader::default());
    let cache = Arc::new(ResultCache::open(root));
    let services = Services::new(upgrader.clone(), Arc::new(SyntaxValidator)).with_cache(cache.clone());

    let outcome = run_pipeline(load(root), &PythonReferences, config(), services.clone())
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 4);
    assert_eq!(outcome.failed(), 0, "{:#?}", outcome.results);
    assert!(outcome.cycles.is_empty());

    // Dependencies are transformed before their dependents
    assert!(upgrader.position("pkg/util.py") < upgrader.position("pkg/model.py"));
    assert!(upgrader.position("pkg/model.py") < upgrader.position("main.py"));

    let util = fs::read_to_string(root.join("pkg/util.py")).unwrap();
    assert!(util.contains("np.asarray(values)"));
    let result = &outcome.results[&ItemId::from("pkg/util.py")];
    assert_eq!(result.attempts, 1);
    assert!(result.changes.contains(&"Added call: np.asarray".to_string()));
    assert!(result.diff.as_deref().unwrap().contains("+    return np.asarray(values) * 2"));

    // Unchanged content on the second run is served entirely from the cache
    let calls = upgrader.seen().len();
    let second = run_pipeline(load(root), &PythonReferences, config(), services)
        .await
        .unwrap();
    assert_eq!(upgrader.seen().len(), calls);
    assert_eq!(second.from_cache(), 4);
    assert!(second.results.values().all(|r| r.mode == ProcessingMode::Cached));
    assert_eq!(fs::read_to_string(root.join("pkg/util.py")).unwrap(), util);
}

#[tokio::test]
async fn test_large_file_is_processed_in_chunks() {
    let repo = tempfile::Builder::new().prefix("upcast").tempdir().unwrap();
    let mut source = String::from("import numpy as np\n");
    for i in 0..40 {
        source.push_str(&format!("\n\ndef f{}(x):\n    return np.array(x) + {}\n", i, i));
    }
    let path = repo.path().join("big.py");
    fs::write(&path, &source).unwrap();

    let upgrader = Arc::new(ArrayUpgrader::default());
    let services = Services::new(upgrader.clone(), Arc::new(SyntaxValidator));
    let config = PipelineConfig {
        chunk_from_start_lines: 100,
        use_cache: false,
        ..config()
    };

    let outcome = run_pipeline(load(repo.path()), &PythonReferences, config, services)
        .await
        .unwrap();

    let result = &outcome.results[&ItemId::from("big.py")];
    assert!(result.success, "{:?}", result.failure);
    assert_eq!(result.mode, ProcessingMode::Chunked);
    assert_eq!(result.attempts, 40);
    assert_eq!(upgrader.seen().len(), 40);

    let upgraded = fs::read_to_string(&path).unwrap();
    assert!(!upgraded.contains("np.array("));
    assert_eq!(upgraded.matches("np.asarray(x)").count(), 40);
    assert!(upgraded.starts_with("import numpy as np\n\ndef f0(x):"));
}

fn upcast(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_upcast"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env("UPCAST_RATE_LIMIT", "1000")
        .output()
        .expect("Failed to execute upcast")
}

#[test]
fn test_cli_invocation() {
    let output = Command::new(env!("CARGO_BIN_EXE_upcast"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("upcast"));
    for command in ["run", "stats", "clear", "graph"] {
        assert!(stdout.contains(command), "missing {}", command);
    }
}

#[test]
fn test_cli_graph_prints_levels() {
    let repo = create_repo();
    let output = upcast(repo.path(), &["graph"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("4 files, 2 dependencies"));
    assert!(stdout.contains("Level 2:\n  main.py"));
}

#[test]
fn test_cli_dry_run_into_output_directory() {
    let repo = create_repo();
    let out = tempfile::tempdir().unwrap();
    let report = out.path().join("report.json");
    let target = out.path().join("upgraded");

    let output = upcast(
        repo.path(),
        &[
            "run",
            "--provider",
            "echo",
            "--output",
            target.to_str().unwrap(),
            "--json-report",
            report.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    // The copy is transformed and cached, the source tree is untouched
    assert!(target.join("pkg/util.py").exists());
    assert!(target.join("README.md").exists());
    assert!(target.join(".upcast").is_dir());
    assert!(!repo.path().join(".upcast").exists());

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["results"].as_object().unwrap().len(), 4);
    assert_eq!(report["results"]["pkg/util.py"]["success"], true);

    let stats = upcast(&target, &["stats"]);
    assert!(String::from_utf8_lossy(&stats.stdout).contains("successful: 4"));

    let cleared = upcast(&target, &["clear"]);
    assert!(cleared.status.success());
    assert!(!target.join(".upcast").exists());
}
