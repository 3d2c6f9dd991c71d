//! Run progress counters, safe to poll while workers are running

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use upcast_core::TransformResult;

#[derive(Debug, Default)]
pub struct Progress {
    total: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cached: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub failed: usize,
    pub cached: usize,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn record(&self, result: &TransformResult) {
        if result.from_cache {
            self.cached.fetch_add(1, Ordering::Relaxed);
        }
        if !result.success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cached: self.cached.load(Ordering::Relaxed),
        }
    }
}
