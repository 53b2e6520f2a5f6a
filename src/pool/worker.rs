//! Worker executor: one OS thread that loads its own registry copy and
//! runs render tasks to completion, one at a time.
//!
//! Lifecycle: `Spawning → Loading → Idle ↔ Running → Retiring → Terminated`.
//! The `Loading → Idle` transition emits a warmup-complete event that
//! `initialize()` blocks on. A worker retires on idle timeout (only while
//! the pool stays above its floor), on shutdown, or when the caller
//! abandoned its in-flight task after a timeout.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::registry::{RegistryLoader, RenderContext, RouteRegistry};
use crate::render::{self, RenderOutcome};
use crate::task::{self, RenderOutput, RenderTask};

use super::metrics::PoolCounters;

/// Executor lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Spawning,
    Loading,
    Idle,
    Running,
    Retiring,
    Terminated,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Spawning,
            1 => WorkerState::Loading,
            2 => WorkerState::Idle,
            3 => WorkerState::Running,
            4 => WorkerState::Retiring,
            _ => WorkerState::Terminated,
        }
    }
}

/// Shared per-worker slot the pool observes the executor through
pub(crate) struct WorkerSlot {
    pub id: u32,
    state: AtomicU8,
    registry_loaded: AtomicBool,
}

impl WorkerSlot {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            state: AtomicU8::new(WorkerState::Spawning as u8),
            registry_loaded: AtomicBool::new(false),
        }
    }

    pub fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn registry_loaded(&self) -> bool {
        self.registry_loaded.load(Ordering::SeqCst)
    }
}

/// Introspection triple exposed per worker
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerStatus {
    pub ok: bool,
    pub worker_id: u32,
    pub registry_loaded: bool,
}

impl WorkerStatus {
    pub(crate) fn from_slot(slot: &WorkerSlot) -> Self {
        let state = slot.state();
        Self {
            ok: matches!(state, WorkerState::Idle | WorkerState::Running),
            worker_id: slot.id,
            registry_loaded: slot.registry_loaded(),
        }
    }
}

/// Outcome claim for a task: exactly one side wins the CAS from `PENDING`.
/// The worker claims `DELIVERED` before sending its reply; a caller whose
/// deadline fired claims `ABANDONED` and stops waiting.
pub(crate) const FATE_PENDING: u8 = 0;
pub(crate) const FATE_DELIVERED: u8 = 1;
pub(crate) const FATE_ABANDONED: u8 = 2;

/// One task in flight through the pool queue
pub(crate) struct PoolJob {
    pub task: RenderTask,
    pub reply_tx: may::sync::mpsc::Sender<RenderOutput>,
    /// See the `FATE_*` constants; decides who owns the slot accounting
    /// when a per-task timeout is configured.
    pub fate: Arc<AtomicU8>,
}

/// Everything a worker thread needs, moved into it at spawn
pub(crate) struct WorkerContext {
    pub slot: Arc<WorkerSlot>,
    pub counters: Arc<PoolCounters>,
    pub jobs: Receiver<PoolJob>,
    pub ready_tx: Sender<u32>,
    pub loader: RegistryLoader,
    pub idle_timeout: Duration,
    pub min_workers: usize,
}

/// Decrements the live-worker gauge and marks the slot terminated even if
/// the thread unwinds.
struct LiveGuard {
    slot: Arc<WorkerSlot>,
    counters: Arc<PoolCounters>,
    deregistered: bool,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        if !self.deregistered {
            self.counters.live_workers.fetch_sub(1, Ordering::SeqCst);
        }
        self.slot.set_state(WorkerState::Terminated);
    }
}

/// Worker thread entry point.
pub(crate) fn run_worker(ctx: WorkerContext) {
    let WorkerContext {
        slot,
        counters,
        jobs,
        ready_tx,
        loader,
        idle_timeout,
        min_workers,
    } = ctx;

    let mut guard = LiveGuard {
        slot: slot.clone(),
        counters: counters.clone(),
        deregistered: false,
    };

    slot.set_state(WorkerState::Loading);
    let registry = loader();
    slot.registry_loaded.store(true, Ordering::SeqCst);

    slot.set_state(WorkerState::Idle);
    counters.idle_workers.fetch_add(1, Ordering::SeqCst);
    // Warmup complete; initialize() counts these before returning.
    let _ = ready_tx.send(slot.id);
    debug!(worker_id = slot.id, routes = registry.len(), "Worker warmup complete");

    loop {
        match jobs.recv_timeout(idle_timeout) {
            Ok(job) => {
                counters.queue_depth.fetch_sub(1, Ordering::SeqCst);

                // A task abandoned while still queued is dropped unexecuted;
                // this worker never ran it and stays in rotation.
                if job.fate.load(Ordering::SeqCst) == FATE_ABANDONED {
                    debug!(worker_id = slot.id, "Dropping task abandoned in queue");
                    continue;
                }

                counters.idle_workers.fetch_sub(1, Ordering::SeqCst);
                slot.set_state(WorkerState::Running);

                let output = execute_task(&registry, &job.task, slot.id);

                let delivered = job
                    .fate
                    .compare_exchange(
                        FATE_PENDING,
                        FATE_DELIVERED,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok();

                if !delivered {
                    // Caller timed out while this render was running; the
                    // slot is burned. Retire and let the pool respawn
                    // toward its floor on the next submission.
                    warn!(worker_id = slot.id, "Task abandoned by caller, retiring worker");
                    slot.set_state(WorkerState::Retiring);
                    break;
                }

                if job.reply_tx.send(output).is_err() {
                    // Caller went away without a timeout: discard the reply
                    // and keep serving.
                    debug!(worker_id = slot.id, "Reply discarded, caller gone");
                }

                slot.set_state(WorkerState::Idle);
                counters.idle_workers.fetch_add(1, Ordering::SeqCst);
            }
            Err(RecvTimeoutError::Timeout) => {
                if try_retire_above_floor(&counters, min_workers) {
                    debug!(worker_id = slot.id, "Idle timeout, retiring");
                    counters.idle_workers.fetch_sub(1, Ordering::SeqCst);
                    slot.set_state(WorkerState::Retiring);
                    guard.deregistered = true;
                    break;
                }
                // At the floor: keep waiting.
            }
            Err(RecvTimeoutError::Disconnected) => {
                // Pool shutdown; the queue has been drained.
                counters.idle_workers.fetch_sub(1, Ordering::SeqCst);
                slot.set_state(WorkerState::Retiring);
                break;
            }
        }
    }

    drop(guard);
    debug!(worker_id = slot.id, "Worker terminated");
}

/// Atomically release one live slot, but never below the pool floor.
fn try_retire_above_floor(counters: &PoolCounters, min_workers: usize) -> bool {
    counters
        .live_workers
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            if n > min_workers {
                Some(n - 1)
            } else {
                None
            }
        })
        .is_ok()
}

/// Run one task against this worker's registry copy.
///
/// Always produces a `RenderOutput` value: resolution failures and renderer
/// errors become synthesized 500 documents, never worker faults.
fn execute_task(registry: &RouteRegistry, task: &RenderTask, worker_id: u32) -> RenderOutput {
    let request = match task::reconstruct(task) {
        Ok(request) => request,
        Err(err) => {
            let message = err.to_string();
            let page = render::error_page(500, "Bad Render Task", &message, None);
            return RenderOutput::new(500, page, 0, worker_id).with_error(message);
        }
    };

    let Some(route) = registry.resolve(&task.route_name) else {
        let message = format!("route '{}' not present in worker registry", task.route_name);
        let page = render::error_page(500, "Unknown Route", &message, None);
        return RenderOutput::new(500, page, 0, worker_id).with_error(message);
    };

    // Captures are re-derived from the identical registry copy rather than
    // shipped in the task.
    let path = request.url.path().to_string();
    let params = route
        .pattern
        .captures(&path)
        .map(|caps| {
            route
                .pattern
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.to_string(), m.as_str().to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let ctx = RenderContext {
        route_name: task.route_name.clone(),
        path,
        params,
        locals: request.locals,
        worker_id,
    };

    match render::render_route(route, &task.data, &ctx) {
        RenderOutcome::Ok { html, duration_ms } => {
            RenderOutput::new(200, html, duration_ms, worker_id)
        }
        RenderOutcome::Failed {
            page,
            message,
            duration_ms,
        } => RenderOutput::new(500, page, duration_ms, worker_id).with_error(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RegistryBuilder, RouteDefinition};
    use serde_json::Value;
    use std::collections::HashMap;

    fn ok_renderer(_data: &Value, ctx: &RenderContext) -> anyhow::Result<String> {
        Ok(format!("<html>worker {}</html>", ctx.worker_id))
    }

    fn failing_renderer(_data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
        anyhow::bail!("boom")
    }

    fn test_registry() -> RouteRegistry {
        RegistryBuilder::new()
            .route(RouteDefinition::new("Ok", r"^/ok$", ok_renderer))
            .route(RouteDefinition::new("Boom", r"^/boom$", failing_renderer))
            .route(RouteDefinition::new(
                "Item",
                r"^/items/(?P<id>\d+)$",
                ok_renderer,
            ))
            .build()
    }

    fn task_for(path: &str, route: &str) -> RenderTask {
        RenderTask {
            url: format!("http://localhost{path}"),
            method: "GET".to_string(),
            headers: HashMap::new(),
            route_name: route.to_string(),
            data: Value::Null,
            body: None,
            locals: HashMap::new(),
        }
    }

    #[test]
    fn test_execute_ok() {
        let registry = test_registry();
        let output = execute_task(&registry, &task_for("/ok", "Ok"), 3);
        assert_eq!(output.status, 200);
        assert_eq!(output.worker_id, 3);
        assert_eq!(output.html, "<html>worker 3</html>");
        assert!(output.error.is_none());
    }

    #[test]
    fn test_execute_render_error_is_value() {
        let registry = test_registry();
        let output = execute_task(&registry, &task_for("/boom", "Boom"), 1);
        assert_eq!(output.status, 500);
        assert_eq!(output.error.as_deref(), Some("boom"));
        assert!(output.html.contains("boom"));
    }

    #[test]
    fn test_execute_unknown_route() {
        let registry = test_registry();
        let output = execute_task(&registry, &task_for("/ok", "Missing"), 1);
        assert_eq!(output.status, 500);
        assert!(output.error.unwrap().contains("Missing"));
    }

    #[test]
    fn test_worker_state_round_trip() {
        let slot = WorkerSlot::new(7);
        assert_eq!(slot.state(), WorkerState::Spawning);
        slot.set_state(WorkerState::Running);
        assert_eq!(slot.state(), WorkerState::Running);
        let status = WorkerStatus::from_slot(&slot);
        assert!(status.ok);
        assert_eq!(status.worker_id, 7);
        assert!(!status.registry_loaded);
    }
}
