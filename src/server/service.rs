use std::io;
use std::sync::Arc;

use may_minihttp::{HttpService, Request, Response};
use serde_json::json;

use super::request::{parse_request, split_query};
use super::response::{write_json_no_cache, write_reply};
use crate::dispatcher::{RenderDispatcher, METRICS_ENDPOINT_SUFFIX};

/// Suffix of the server identification endpoint
const SERVER_INFO_SUFFIX: &str = "/api/server-info";

/// HTTP boundary service: parses the request, answers the introspection
/// endpoints inline, and hands everything else to the dispatcher.
#[derive(Clone)]
pub struct AppService {
    pub dispatcher: Arc<RenderDispatcher>,
}

impl AppService {
    pub fn new(dispatcher: Arc<RenderDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Pool/dispatcher introspection document served at `/api/metrics`.
    ///
    /// Runs on the request coroutine in every mode so it can read the live
    /// pool state.
    fn metrics_document(&self) -> serde_json::Value {
        let mode = self.dispatcher.mode().to_string();
        match self.dispatcher.pool() {
            Some(pool) => {
                let snapshot = pool.metrics();
                let config = pool.config();
                let total = snapshot.completed + snapshot.failed;
                let (success_pct, failure_pct) = if total == 0 {
                    (100.0, 0.0)
                } else {
                    let failure = snapshot.failed as f64 / total as f64 * 100.0;
                    (100.0 - failure, failure)
                };
                json!({
                    "mode": mode,
                    "initialized": pool.is_initialized(),
                    "healthy": pool.is_healthy(),
                    "threads": {
                        "active": snapshot.active_workers,
                        "idle": snapshot.idle_workers,
                        "min": config.min_workers,
                        "max": config.max_workers,
                    },
                    "queue_size": snapshot.queue_depth,
                    "completed": snapshot.completed,
                    "metrics": {
                        "submitted": snapshot.submitted,
                        "completed": snapshot.completed,
                        "failed": snapshot.failed,
                        "success_percent": success_pct,
                        "failure_percent": failure_pct,
                        "avg_duration_ms": snapshot.avg_duration_ms,
                    },
                })
            }
            None => json!({
                "mode": mode,
                "initialized": false,
                "healthy": true,
                "threads": { "active": 0, "idle": 0, "min": 0, "max": 0 },
                "queue_size": 0,
                "completed": 0,
                "metrics": {
                    "submitted": 0,
                    "completed": 0,
                    "failed": 0,
                    "success_percent": 100.0,
                    "failure_percent": 0.0,
                    "avg_duration_ms": 0.0,
                },
            }),
        }
    }

    /// Runtime identification used by the benchmark client to label results.
    fn server_info_document(&self) -> serde_json::Value {
        json!({
            "server": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "mode": self.dispatcher.mode().to_string(),
            "pid": std::process::id(),
        })
    }
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let incoming = parse_request(req);
        let (path, _query) = split_query(&incoming.path);

        if incoming.method == http::Method::GET {
            if path == "/health" {
                write_json_no_cache(res, 200, &json!({ "status": "ok" }));
                return Ok(());
            }
            if path.ends_with(METRICS_ENDPOINT_SUFFIX) {
                write_json_no_cache(res, 200, &self.metrics_document());
                return Ok(());
            }
            if path.ends_with(SERVER_INFO_SUFFIX) {
                write_json_no_cache(res, 200, &self.server_info_document());
                return Ok(());
            }
        }

        let reply = self.dispatcher.handle(&incoming);
        write_reply(res, &reply);
        Ok(())
    }
}
