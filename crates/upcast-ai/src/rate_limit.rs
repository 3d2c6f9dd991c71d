//! Sliding-window rate limiting for transformer calls
//!
//! A single limiter is shared by every worker of a run. Admissions are kept as
//! timestamps; at most `max_calls` of them may fall inside any window of
//! `window` length. Callers that are refused get the time until the oldest
//! admission leaves the window and sleep outside the lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use upcast_core::RateLimitConfig;

/// Floor for retry sleeps, so a caller refused exactly at the window edge
/// does not spin.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Source of "now" for the limiter.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for simulated time.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|p| p.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Sliding-window admission gate.
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    admitted: Mutex<VecDeque<Instant>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_calls", &self.max_calls)
            .field("window", &self.window)
            .finish()
    }
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let max_calls = (config.max_calls as usize).max(1);
        Self {
            max_calls,
            window: config.window(),
            clock,
            admitted: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.admitted.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Try to admit one call now. Returns zero when admitted, otherwise how
    /// long until a slot frees up (nothing is recorded in that case).
    pub fn acquire(&self) -> Duration {
        self.try_admit().err().unwrap_or(Duration::ZERO)
    }

    fn try_admit(&self) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut admitted = self.lock();

        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) > self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        match admitted.front() {
            Some(&oldest) if admitted.len() >= self.max_calls => {
                Err(oldest
                    .checked_add(self.window)
                    .map_or(Duration::MAX, |free| free.saturating_duration_since(now)))
            }
            _ => {
                admitted.push_back(now);
                Ok(())
            }
        }
    }

    /// Wait until a call is admitted.
    pub async fn admit(&self) {
        loop {
            match self.try_admit() {
                Ok(()) => return,
                Err(wait) => {
                    tracing::debug!("Rate limit reached, waiting {:.1}s", wait.as_secs_f64());
                    tokio::time::sleep(wait.max(MIN_WAIT)).await;
                }
            }
        }
    }

    /// Admissions currently inside the window.
    pub fn in_window(&self) -> usize {
        let now = self.clock.now();
        self.lock()
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) <= self.window)
            .count()
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
