//! Per-request render dispatch: match the route, fetch data on the caller,
//! then render inline or through the worker pool according to the mode and
//! the classification heuristic.
//!
//! Recovery is local for `NotFound`, `DataFetchFailed` and `RenderFailed`
//! (each maps to a complete HTML error document) and for `QueueFull` (the
//! render silently falls back inline, which also serializes the offending
//! request and so slows ingress naturally). Everything else is logged and
//! surfaced as a 5xx page. A reply is always a whole document, never a
//! truncated stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::SsrMode;
use crate::error::DispatchError;
use crate::fetch::fetch_data;
use crate::middleware::Middleware;
use crate::pool::WorkerPool;
use crate::registry::{FetchContext, RenderContext, RouteDefinition, RouteRegistry};
use crate::render::{self, RenderOutcome};
use crate::task::{self, IncomingRequest, RenderOutput, status_reason};

use super::classify::{classify, Decision, ExecPath};
use super::stats::{RequestStats, RouteStat};

/// Reply header naming the execution path that produced the body:
/// `inline`, `worker`, or `fallback` (queue-full inline fallback).
pub const RENDER_PATH_HEADER: &str = "x-render-path";

/// Reply header carrying the id of the worker that rendered the body;
/// absent on inline renders.
pub const WORKER_ID_HEADER: &str = "x-worker-id";

/// Fully assembled response handed back to the HTTP boundary
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub reason: String,
    pub headers: HashMap<String, String>,
    pub html: String,
}

impl Reply {
    pub fn html(status: u16, html: String) -> Self {
        Self {
            status,
            reason: status_reason(status).to_string(),
            headers: HashMap::new(),
            html,
        }
    }

    pub fn from_output(output: RenderOutput) -> Self {
        let mut headers = output.headers;
        if output.worker_id >= 1 {
            headers.insert(WORKER_ID_HEADER.to_string(), output.worker_id.to_string());
        }
        Self {
            status: output.status,
            reason: output.reason,
            headers,
            html: output.html,
        }
    }

    fn with_render_path(mut self, path: &str) -> Self {
        self.headers
            .insert(RENDER_PATH_HEADER.to_string(), path.to_string());
        self
    }

    /// Execution path marker, when present
    pub fn render_path(&self) -> Option<&str> {
        self.headers.get(RENDER_PATH_HEADER).map(String::as_str)
    }
}

/// The render dispatcher: one per process, shared across request coroutines.
pub struct RenderDispatcher {
    registry: Arc<RouteRegistry>,
    pool: Option<Arc<WorkerPool>>,
    mode: SsrMode,
    stats: Mutex<RequestStats>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl RenderDispatcher {
    pub fn new(registry: Arc<RouteRegistry>, mode: SsrMode) -> Self {
        Self {
            registry,
            pool: None,
            mode,
            stats: Mutex::new(RequestStats::new()),
            middlewares: Vec::new(),
        }
    }

    /// Attach the worker pool used by `worker` and `hybrid` modes.
    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Append middleware; runs in registration order.
    pub fn add_middleware(&mut self, mw: Arc<dyn Middleware>) {
        self.middlewares.push(mw);
    }

    pub fn mode(&self) -> SsrMode {
        self.mode
    }

    pub fn pool(&self) -> Option<&Arc<WorkerPool>> {
        self.pool.as_ref()
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    /// Observed stats for a URL, if any (copy-on-read).
    pub fn url_stat(&self, url: &str) -> Option<RouteStat> {
        self.stats.lock().unwrap().get(url)
    }

    /// Number of URLs currently tracked
    pub fn tracked_urls(&self) -> usize {
        self.stats.lock().unwrap().len()
    }

    /// Process one request end to end.
    pub fn handle(&self, req: &IncomingRequest) -> Reply {
        let started = Instant::now();
        let mut locals: HashMap<String, Value> = HashMap::new();

        let mut early: Option<Reply> = None;
        for mw in &self.middlewares {
            if early.is_none() {
                early = mw.before(req, &mut locals);
            } else {
                mw.before(req, &mut locals);
            }
        }

        let mut reply = match early {
            Some(reply) => reply,
            None => self.dispatch(req, locals),
        };

        let latency = started.elapsed();
        for mw in &self.middlewares {
            mw.after(req, &mut reply, latency);
        }
        reply
    }

    fn dispatch(&self, req: &IncomingRequest, locals: HashMap<String, Value>) -> Reply {
        let started = Instant::now();
        let path = req.path.split('?').next().unwrap_or("/").to_string();

        let Some(route_match) = self.registry.match_path(&path) else {
            debug!(path = %path, "No route matched");
            return Reply::html(404, render::not_found_page(&path)).with_render_path("inline");
        };
        let route = route_match.route;
        let params = route_match.params;

        let url = match req.absolute_url() {
            Ok(url) => url,
            Err(err) => {
                warn!(path = %path, error = %err, "Request could not be normalized");
                return Reply::html(
                    err.status_code(),
                    render::error_page(err.status_code(), "Bad Request", &err.to_string(), None),
                )
                .with_render_path("inline");
            }
        };

        // Data stage always runs on the caller, before any execution-path
        // decision is made.
        let fetch_ctx = FetchContext {
            method: Some(req.method.clone()),
            headers: req.headers.clone(),
            params: params.clone(),
            locals: locals.clone(),
        };
        let (data, fetch_ms) = match fetch_data(route, &url, &fetch_ctx) {
            Ok(fetched) => fetched,
            Err((err, fetch_ms)) => {
                error!(
                    route = route.name,
                    url = %url,
                    fetch_ms,
                    error = %err,
                    "Data stage failed"
                );
                return Reply::html(
                    500,
                    render::error_page(500, "Data Fetch Failed", &err.to_string(), None),
                )
                .with_render_path("inline");
            }
        };

        let stat = self.stats.lock().unwrap().get(&req.path);
        let decision = classify(self.mode, &path, stat);
        debug!(
            url = %req.path,
            mode = %self.mode,
            decision = ?decision.path,
            rule = decision.rule,
            fetch_ms,
            "Mode decision"
        );

        let reply = match decision.path {
            ExecPath::Inline => self
                .render_inline(route, &data, &path, &params, &locals)
                .with_render_path("inline"),
            ExecPath::Worker => {
                self.render_on_worker(req, route, &data, &path, &params, &locals, decision)
            }
        };

        let total_ms = started.elapsed().as_millis() as u64;
        self.stats.lock().unwrap().record(&req.path, total_ms);

        reply
    }

    fn render_inline(
        &self,
        route: &RouteDefinition,
        data: &Value,
        path: &str,
        params: &HashMap<String, String>,
        locals: &HashMap<String, Value>,
    ) -> Reply {
        let ctx = RenderContext {
            route_name: route.name.to_string(),
            path: path.to_string(),
            params: params.clone(),
            locals: locals.clone(),
            worker_id: 0,
        };
        match render::render_route(route, data, &ctx) {
            RenderOutcome::Ok { html, .. } => Reply::html(200, html),
            RenderOutcome::Failed { page, .. } => Reply::html(500, page),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_on_worker(
        &self,
        req: &IncomingRequest,
        route: &RouteDefinition,
        data: &Value,
        path: &str,
        params: &HashMap<String, String>,
        locals: &HashMap<String, Value>,
        decision: Decision,
    ) -> Reply {
        let Some(pool) = &self.pool else {
            warn!(
                route = route.name,
                rule = decision.rule,
                "Worker path chosen but no pool attached; rendering inline"
            );
            return self
                .render_inline(route, data, path, params, locals)
                .with_render_path("inline");
        };

        let task = match task::assemble(req, route.name, data.clone(), locals.clone()) {
            Ok(task) => task,
            Err(err) => {
                warn!(route = route.name, error = %err, "Task assembly failed");
                return Reply::html(
                    err.status_code(),
                    render::error_page(
                        err.status_code(),
                        "Bad Request",
                        &err.to_string(),
                        None,
                    ),
                )
                .with_render_path("inline");
            }
        };

        match pool.submit(task) {
            Ok(output) => Reply::from_output(output).with_render_path("worker"),
            Err(DispatchError::QueueFull { cap }) => {
                // Cooperative backpressure: render on the caller instead.
                debug!(route = route.name, cap, "Queue full, falling back inline");
                self.render_inline(route, data, path, params, locals)
                    .with_render_path("fallback")
            }
            Err(err @ DispatchError::PoolClosed) => {
                warn!(route = route.name, error = %err, "Pool closed during dispatch");
                Reply::html(
                    503,
                    render::error_page(503, "Service Unavailable", &err.to_string(), None),
                )
                .with_render_path("worker")
            }
            Err(err) => {
                error!(
                    route = route.name,
                    url = %req.path,
                    mode = %self.mode,
                    error = %err,
                    "Worker dispatch failed"
                );
                Reply::html(
                    err.status_code(),
                    render::error_page(
                        err.status_code(),
                        "Render Dispatch Failed",
                        &err.to_string(),
                        None,
                    ),
                )
                .with_render_path("worker")
            }
        }
    }
}
