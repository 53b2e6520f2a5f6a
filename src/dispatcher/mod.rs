//! # Dispatcher Module
//!
//! Per-request entry point of the render core. For each parsed request the
//! dispatcher matches a route, runs the data stage on the caller, picks an
//! execution path (inline or worker) from the mode and the classification
//! heuristic, assembles the reply, and feeds the observed duration back
//! into the per-URL stats the hybrid classifier consults.

mod classify;
mod core;
mod stats;

pub use classify::{classify, Decision, ExecPath, METRICS_ENDPOINT_SUFFIX};
pub use core::{RenderDispatcher, Reply, RENDER_PATH_HEADER, WORKER_ID_HEADER};
pub use stats::{RequestStats, RouteStat};
