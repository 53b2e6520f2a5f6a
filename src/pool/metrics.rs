//! Worker pool metrics: cumulative counters, live gauges, and a rolling
//! window over the last 100 completed tasks.
//!
//! Counters and gauges are atomics so workers can update their own idle
//! state without locks; the rolling window is only touched on the main
//! tier, when `submit` receives a reply. `snapshot()` is a copy-on-read
//! view that is safe to call concurrently with submissions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::Serialize;

/// Number of recent task outcomes kept for rolling statistics
const ROLLING_WINDOW: usize = 100;

/// Point-in-time view of pool activity
#[derive(Debug, Clone, Serialize)]
pub struct WorkerPoolMetrics {
    /// Tasks accepted by `submit`
    pub submitted: u64,
    /// Tasks that produced a `RenderOutput` (including synthesized 500s)
    pub completed: u64,
    /// Tasks lost to worker faults (`WorkerDied` / `WorkerTimedOut`)
    pub failed: u64,
    /// Live worker executors
    pub active_workers: usize,
    /// Workers currently waiting for a task
    pub idle_workers: usize,
    /// Tasks queued and not yet picked up by a worker
    pub queue_depth: usize,
    /// Rolling average duration of the last 100 completed tasks
    pub avg_duration_ms: f64,
    /// Share of faulted tasks in the rolling window, 0.0–1.0
    pub failure_rate: f64,
}

#[derive(Default)]
struct RollingWindow {
    durations: VecDeque<u64>,
    /// true = fault, false = completed
    faults: VecDeque<bool>,
}

/// Shared counter block; one per pool, referenced by every worker.
pub(crate) struct PoolCounters {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub queue_depth: AtomicUsize,
    pub idle_workers: AtomicUsize,
    pub live_workers: AtomicUsize,
    rolling: Mutex<RollingWindow>,
}

impl PoolCounters {
    pub fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            queue_depth: AtomicUsize::new(0),
            idle_workers: AtomicUsize::new(0),
            live_workers: AtomicUsize::new(0),
            rolling: Mutex::new(RollingWindow::default()),
        }
    }

    /// Record a task that came back with a `RenderOutput`.
    ///
    /// Per-task renderer errors are completions, not faults: the pool
    /// stayed healthy and delivered a value.
    pub fn record_completion(&self, duration_ms: u64) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        let mut window = self.rolling.lock().unwrap();
        push_capped(&mut window.durations, duration_ms);
        push_capped(&mut window.faults, false);
    }

    /// Record a task lost to a worker fault.
    pub fn record_fault(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        let mut window = self.rolling.lock().unwrap();
        push_capped(&mut window.faults, true);
    }

    pub fn failure_rate(&self) -> f64 {
        let window = self.rolling.lock().unwrap();
        if window.faults.is_empty() {
            return 0.0;
        }
        let faults = window.faults.iter().filter(|&&f| f).count();
        faults as f64 / window.faults.len() as f64
    }

    pub fn avg_duration_ms(&self) -> f64 {
        let window = self.rolling.lock().unwrap();
        if window.durations.is_empty() {
            return 0.0;
        }
        let total: u64 = window.durations.iter().sum();
        total as f64 / window.durations.len() as f64
    }

    pub fn snapshot(&self) -> WorkerPoolMetrics {
        WorkerPoolMetrics {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            active_workers: self.live_workers.load(Ordering::Relaxed),
            idle_workers: self.idle_workers.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            avg_duration_ms: self.avg_duration_ms(),
            failure_rate: self.failure_rate(),
        }
    }
}

fn push_capped<T>(queue: &mut VecDeque<T>, value: T) {
    if queue.len() == ROLLING_WINDOW {
        queue.pop_front();
    }
    queue.push_back(value);
}
