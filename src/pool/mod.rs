//! # Worker Pool Module
//!
//! Lifecycle manager for the render worker executors: spawns between
//! `min_workers` and `max_workers` OS threads, transports [`RenderTask`]s
//! to them over a shared FIFO queue, enforces the `max_workers * 4` queue
//! cap, and tracks submission/completion metrics.
//!
//! Each worker loads its own copy of the route registry during warmup and
//! resolves tasks by route name; nothing but plain values crosses the
//! thread boundary. A renderer error inside a worker is delivered back as
//! a value (a synthesized 500 page in the output) — the pool only counts a
//! failure when a worker dies or a task deadline fires.
//!
//! [`RenderTask`]: crate::task::RenderTask

mod core;
mod metrics;
mod worker;

pub use core::{PoolConfig, WorkerPool};
pub use metrics::WorkerPoolMetrics;
pub use worker::{WorkerState, WorkerStatus};
