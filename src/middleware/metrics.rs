use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::Value;

use super::Middleware;
use crate::dispatcher::{Reply, RENDER_PATH_HEADER};
use crate::task::IncomingRequest;

/// Middleware collecting request-level metrics
///
/// Tracks total request count, average latency, and how many replies came
/// from each execution path. All counters use atomic operations; reads are
/// lock-free and safe alongside request processing.
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    inline_renders: AtomicUsize,
    worker_renders: AtomicUsize,
    fallback_renders: AtomicUsize,
}

impl Default for MetricsMiddleware {
    fn default() -> Self {
        Self {
            request_count: AtomicUsize::new(0),
            total_latency_ns: AtomicU64::new(0),
            inline_renders: AtomicUsize::new(0),
            worker_renders: AtomicUsize::new(0),
            fallback_renders: AtomicUsize::new(0),
        }
    }
}

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Mean processing time across all requests; zero before any complete.
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// `(inline, worker, fallback)` reply counts by execution path
    pub fn render_path_counts(&self) -> (usize, usize, usize) {
        (
            self.inline_renders.load(Ordering::Relaxed),
            self.worker_renders.load(Ordering::Relaxed),
            self.fallback_renders.load(Ordering::Relaxed),
        )
    }
}

impl Middleware for MetricsMiddleware {
    fn before(
        &self,
        _req: &IncomingRequest,
        _locals: &mut HashMap<String, Value>,
    ) -> Option<Reply> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn after(&self, _req: &IncomingRequest, res: &mut Reply, latency: Duration) {
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        match res.headers.get(RENDER_PATH_HEADER).map(String::as_str) {
            Some("worker") => self.worker_renders.fetch_add(1, Ordering::Relaxed),
            Some("fallback") => self.fallback_renders.fetch_add(1, Ordering::Relaxed),
            _ => self.inline_renders.fetch_add(1, Ordering::Relaxed),
        };
    }
}
