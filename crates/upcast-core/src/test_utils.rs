//! Test utilities for Upcast

use crate::model::{ItemId, TransformResult, WorkItem, ProcessingMode, Failure};
use crate::error::FailureKind;
use tempfile::TempDir;
use std::fs;

/// In-memory work item rooted at a fake path.
pub fn item(id: &str, content: &str) -> WorkItem {
    WorkItem::new(id, format!("/virtual/{}", id), content)
}

/// Dependency pair shorthand: `from` depends on `to`.
pub fn dep(from: &str, to: &str) -> (ItemId, ItemId) {
    (ItemId::from(from), ItemId::from(to))
}

pub fn ok_result(id: &str, attempts: u32, output: &str) -> TransformResult {
    let mut result = TransformResult::succeeded(ItemId::from(id), attempts, output.to_string(), ProcessingMode::Whole);
    result.changes = vec!["Added call: np.asarray".to_string()];
    result
}

pub fn failed_result(id: &str, attempts: u32, message: &str) -> TransformResult {
    TransformResult::failed(
        ItemId::from(id),
        attempts,
        Failure::new(FailureKind::ValidationFailure, message),
        ProcessingMode::Whole,
    )
}

/// Create a temporary directory with a small Python package
pub fn create_test_repo() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    fs::create_dir_all(root.join("pkg")).unwrap();

    fs::write(root.join("pkg/__init__.py"), "").unwrap();
    fs::write(root.join("pkg/util.py"), r#"
import numpy as np

def scale(values):
    return np.array(values) * 2
"#).unwrap();

    fs::write(root.join("pkg/model.py"), r#"
from pkg.util import scale

class Model:
    def fit(self, data):
        return scale(data)
"#).unwrap();

    fs::write(root.join("main.py"), r#"
from pkg.model import Model

if __name__ == "__main__":
    Model().fit([1, 2, 3])
"#).unwrap();

    temp_dir
}
