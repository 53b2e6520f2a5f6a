//! Worker pool: owns the worker executors, transports render tasks to
//! them, and enforces the queue cap.
//!
//! Sizing follows the detected CPU count (`min = max(1, cpu/2)`,
//! `max = max(2, cpu)`) unless an explicit worker-thread override pins the
//! pool to an exact size. The queue cap is `max_workers * 4` and is the
//! pool's only backpressure lever: a submit against a full queue fails
//! immediately with `QueueFull`, which the dispatcher treats as a signal to
//! render inline instead.
//!
//! Workers are interchangeable; tasks are FIFO through one shared queue and
//! whichever executor is free picks up the next one. The pool grows up to
//! `max_workers` when a task arrives and nobody is idle, and shrinks
//! passively through the per-worker idle timeout, never below
//! `min_workers`.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::error::DispatchError;
use crate::registry::RegistryLoader;
use crate::task::{RenderOutput, RenderTask};

use super::metrics::{PoolCounters, WorkerPoolMetrics};
use super::worker::{
    run_worker, PoolJob, WorkerContext, WorkerSlot, WorkerStatus, FATE_ABANDONED, FATE_PENDING,
};

/// How long `initialize()` waits for each worker's warmup event
const WARMUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Rolling failure rate above which `is_healthy()` reports false
const UNHEALTHY_FAILURE_RATE: f64 = 0.10;

/// Pool sizing and timing knobs
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// Idle period after which a worker above the floor retires
    pub idle_timeout: Duration,
    /// Optional per-task reply deadline; off by default
    pub task_timeout: Option<Duration>,
}

impl PoolConfig {
    /// Size from a detected CPU count.
    pub fn for_cpus(cpus: usize) -> Self {
        Self {
            min_workers: (cpus / 2).max(1),
            max_workers: cpus.max(2),
            idle_timeout: Duration::from_secs(30),
            task_timeout: None,
        }
    }

    /// Pin the pool to an exact worker count (explicit override).
    pub fn fixed(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            min_workers: workers,
            max_workers: workers,
            idle_timeout: Duration::from_secs(30),
            task_timeout: None,
        }
    }

    /// Resolve sizing from detection plus the optional env override.
    pub fn from_detected(cpus: usize, override_workers: Option<usize>) -> Self {
        match override_workers {
            Some(n) => Self::fixed(n),
            None => Self::for_cpus(cpus),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_task_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout = Some(task_timeout);
        self
    }

    /// Queue cap: tasks accepted beyond currently running ones
    pub fn queue_cap(&self) -> usize {
        self.max_workers * 4
    }
}

struct WorkerHandle {
    slot: Arc<WorkerSlot>,
    join: std::thread::JoinHandle<()>,
}

/// Lifecycle manager for the worker executors
pub struct WorkerPool {
    config: PoolConfig,
    loader: RegistryLoader,
    counters: Arc<PoolCounters>,
    job_tx: Mutex<Option<Sender<PoolJob>>>,
    job_rx: Receiver<PoolJob>,
    ready_tx: Sender<u32>,
    ready_rx: Receiver<u32>,
    workers: Mutex<Vec<WorkerHandle>>,
    next_worker_id: AtomicU32,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, loader: RegistryLoader) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            loader,
            counters: Arc::new(PoolCounters::new()),
            job_tx: Mutex::new(Some(job_tx)),
            job_rx,
            ready_tx,
            ready_rx,
            workers: Mutex::new(Vec::new()),
            next_worker_id: AtomicU32::new(0),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Spawn `min_workers` executors and block until each has loaded its
    /// registry copy.
    pub fn initialize(&self) -> Result<(), DispatchError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(DispatchError::AlreadyInitialized);
        }

        info!(
            min_workers = self.config.min_workers,
            max_workers = self.config.max_workers,
            queue_cap = self.config.queue_cap(),
            idle_timeout_s = self.config.idle_timeout.as_secs(),
            "Initializing worker pool"
        );

        for _ in 0..self.config.min_workers {
            self.spawn_worker()?;
        }

        // Each worker emits exactly one warmup event after loading the
        // registry; count them before declaring the pool ready.
        for _ in 0..self.config.min_workers {
            let worker_id = self.ready_rx.recv_timeout(WARMUP_TIMEOUT).map_err(|_| {
                DispatchError::WorkerInitFailed(
                    "worker did not signal warmup completion".to_string(),
                )
            })?;
            debug!(worker_id, "Warmup event received");
        }

        info!(workers = self.config.min_workers, "Worker pool ready");
        Ok(())
    }

    /// Submit a render task and wait for the worker's output.
    ///
    /// Fails fast with `QueueFull` at the cap — the caller is expected to
    /// fall back to inline rendering. Worker faults surface as `WorkerDied`
    /// or `WorkerTimedOut`; per-task renderer errors come back as values
    /// inside the output and are not faults.
    pub fn submit(&self, task: RenderTask) -> Result<RenderOutput, DispatchError> {
        if self.closed.load(Ordering::SeqCst) || !self.is_initialized() {
            return Err(DispatchError::PoolClosed);
        }

        // Workers retired by faults are replaced here, on the next
        // submission, keeping restoration on the pool's own thread.
        self.ensure_min_workers();

        let cap = self.config.queue_cap();
        // Reserve a queue slot before sending so concurrent submits can
        // never overshoot the cap.
        let depth = self.counters.queue_depth.fetch_add(1, Ordering::SeqCst);
        if depth >= cap {
            self.counters.queue_depth.fetch_sub(1, Ordering::SeqCst);
            debug!(depth, cap, "Queue full, rejecting task");
            return Err(DispatchError::QueueFull { cap });
        }

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        // Grow if nobody is idle and there is headroom.
        if self.counters.idle_workers.load(Ordering::SeqCst) == 0 {
            self.spawn_additional();
        }

        let (reply_tx, reply_rx) = may::sync::mpsc::channel();
        let fate = Arc::new(AtomicU8::new(FATE_PENDING));
        let job = PoolJob {
            task,
            reply_tx,
            fate: fate.clone(),
        };

        let sender = self.job_tx.lock().unwrap().clone();
        let Some(sender) = sender else {
            self.counters.queue_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(DispatchError::PoolClosed);
        };
        if sender.send(job).is_err() {
            self.counters.queue_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(DispatchError::PoolClosed);
        }

        let output = match self.config.task_timeout {
            None => reply_rx.recv().map_err(|_| self.on_worker_died())?,
            Some(timeout) => self.recv_with_timeout(&reply_rx, timeout, &fate)?,
        };

        self.counters.record_completion(output.duration_ms);
        Ok(output)
    }

    /// Wait for a reply with a deadline. The reply channel has no timed
    /// receive that is coroutine-aware, so poll with short sleeps.
    ///
    /// The fate CAS decides who owns the worker's slot accounting: if the
    /// worker claims delivery first, the reply is moments away and the
    /// deadline is waived; if the caller claims abandonment first, the
    /// worker retires after its render and the caller releases the slot.
    fn recv_with_timeout(
        &self,
        reply_rx: &may::sync::mpsc::Receiver<RenderOutput>,
        timeout: Duration,
        fate: &AtomicU8,
    ) -> Result<RenderOutput, DispatchError> {
        let deadline = Instant::now() + timeout;
        loop {
            match reply_rx.try_recv() {
                Ok(output) => return Ok(output),
                Err(std::sync::mpsc::TryRecvError::Empty) => {
                    if Instant::now() >= deadline {
                        let claimed = fate
                            .compare_exchange(
                                FATE_PENDING,
                                FATE_ABANDONED,
                                Ordering::SeqCst,
                                Ordering::SeqCst,
                            )
                            .is_ok();
                        if claimed {
                            // If the render is already running the worker
                            // finishes it, sees the claim, and retires; a
                            // task still queued is dropped unexecuted.
                            self.counters.record_fault();
                            warn!(
                                timeout_ms = timeout.as_millis() as u64,
                                "Render task timed out"
                            );
                            return Err(DispatchError::WorkerTimedOut {
                                timeout_ms: timeout.as_millis() as u64,
                            });
                        }
                        // Worker won the race: its reply is in flight.
                    }
                    may::coroutine::sleep(Duration::from_millis(1));
                }
                Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                    return Err(self.on_worker_died())
                }
            }
        }
    }

    /// A reply channel died without a reply: the executing worker is gone.
    fn on_worker_died(&self) -> DispatchError {
        self.counters.record_fault();
        error!("Worker died with a task in flight");
        self.ensure_min_workers();
        DispatchError::WorkerDied
    }

    /// Snapshot of pool activity; safe to call concurrently with submits.
    pub fn metrics(&self) -> WorkerPoolMetrics {
        self.counters.snapshot()
    }

    /// Introspection triple for every live worker slot.
    pub fn worker_statuses(&self) -> Vec<WorkerStatus> {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .map(|h| WorkerStatus::from_slot(&h.slot))
            .collect()
    }

    /// False once the rolling failure rate exceeds 10% of submissions.
    pub fn is_healthy(&self) -> bool {
        self.counters.failure_rate() <= UNHEALTHY_FAILURE_RATE
    }

    /// Drain in-flight tasks, stop accepting submissions, and wait for all
    /// workers to terminate. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Worker pool shutting down");

        // Dropping the sender disconnects the queue; workers drain what is
        // already queued and then exit.
        *self.job_tx.lock().unwrap() = None;

        let handles: Vec<WorkerHandle> = self.workers.lock().unwrap().drain(..).collect();
        for handle in handles {
            if handle.join.join().is_err() {
                warn!(worker_id = handle.slot.id, "Worker panicked before shutdown");
            }
        }
        info!("Worker pool shut down");
    }

    /// Spawn one worker, reserving a live slot up to `max_workers`.
    fn spawn_additional(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let reserved = self
            .counters
            .live_workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n < self.config.max_workers {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .is_ok();
        if !reserved {
            return;
        }
        if let Err(err) = self.spawn_reserved() {
            self.counters.live_workers.fetch_sub(1, Ordering::SeqCst);
            warn!(error = %err, "Failed to grow worker pool");
        }
    }

    /// Restore the pool toward `min_workers` after a worker fault.
    fn ensure_min_workers(&self) {
        while !self.closed.load(Ordering::SeqCst) {
            let reserved = self
                .counters
                .live_workers
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    if n < self.config.min_workers {
                        Some(n + 1)
                    } else {
                        None
                    }
                })
                .is_ok();
            if !reserved {
                break;
            }
            if let Err(err) = self.spawn_reserved() {
                self.counters.live_workers.fetch_sub(1, Ordering::SeqCst);
                error!(error = %err, "Failed to respawn worker");
                break;
            }
        }
    }

    /// Initialization-path spawn: reserves its own live slot.
    fn spawn_worker(&self) -> Result<(), DispatchError> {
        self.counters.live_workers.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = self.spawn_reserved() {
            self.counters.live_workers.fetch_sub(1, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }

    /// Spawn the executor thread for an already-reserved live slot.
    fn spawn_reserved(&self) -> Result<(), DispatchError> {
        let id = self.next_worker_id.fetch_add(1, Ordering::SeqCst) + 1;
        let slot = Arc::new(WorkerSlot::new(id));
        let ctx = WorkerContext {
            slot: slot.clone(),
            counters: self.counters.clone(),
            jobs: self.job_rx.clone(),
            ready_tx: self.ready_tx.clone(),
            loader: self.loader,
            idle_timeout: self.config.idle_timeout,
            min_workers: self.config.min_workers,
        };

        let join = std::thread::Builder::new()
            .name(format!("render-worker-{id}"))
            .spawn(move || run_worker(ctx))
            .map_err(|e| DispatchError::WorkerInitFailed(e.to_string()))?;

        debug!(worker_id = id, "Worker spawned");
        let mut workers = self.workers.lock().unwrap();
        // Drop handles of workers that already retired; their threads are
        // gone and keeping them would grow the list unboundedly.
        workers.retain(|h| h.slot.state() != super::worker::WorkerState::Terminated);
        workers.push(WorkerHandle { slot, join });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing_policy_from_cpus() {
        let config = PoolConfig::for_cpus(8);
        assert_eq!(config.min_workers, 4);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.queue_cap(), 32);

        // Single CPU still gets a working pool
        let config = PoolConfig::for_cpus(1);
        assert_eq!(config.min_workers, 1);
        assert_eq!(config.max_workers, 2);
    }

    #[test]
    fn test_sizing_override_pins_exact_count() {
        let config = PoolConfig::from_detected(8, Some(1));
        assert_eq!(config.min_workers, 1);
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.queue_cap(), 4);

        let config = PoolConfig::from_detected(1, None);
        assert_eq!(config.max_workers, 2);
    }

    #[test]
    fn test_default_idle_timeout() {
        let config = PoolConfig::for_cpus(4);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert!(config.task_timeout.is_none());
    }
}
