//! Render task schema: the value-only contract between the main tier and
//! the worker tier.
//!
//! A [`RenderTask`] carries everything a worker needs to run a renderer and
//! nothing else: URL, method, headers, the route name (resolved against the
//! worker's own registry copy), the pre-fetched data, and optional body and
//! locals. Every field survives a deep structural copy — no handles, no
//! callbacks, no shared state. [`RenderOutput`] is the reply in the other
//! direction.

use std::collections::HashMap;

use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::DispatchError;

/// Request body state as seen by the dispatcher.
///
/// `Consumed` marks a body that an upstream component already drained from
/// the connection; such a request can no longer be assembled into a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Text(String),
    Consumed,
}

/// Parsed request handed to the dispatcher by the HTTP boundary.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    /// Path including any query string, as received on the wire
    pub path: String,
    /// Header name (lowercased) to single concatenated value
    pub headers: HashMap<String, String>,
    pub body: RequestBody,
}

impl IncomingRequest {
    /// Build the absolute request URL from the Host header and path.
    pub fn absolute_url(&self) -> Result<Url, DispatchError> {
        let host = self
            .headers
            .get("host")
            .map(String::as_str)
            .unwrap_or("localhost");
        let raw = format!("http://{}{}", host, self.path);
        Url::parse(&raw).map_err(|e| DispatchError::MalformedRequest(format!("{raw}: {e}")))
    }
}

/// Task shipped from the main tier to a worker (main → worker).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderTask {
    /// Absolute request URL
    pub url: String,
    /// HTTP method as text
    pub method: String,
    /// Header name to single concatenated value
    pub headers: HashMap<String, String>,
    /// Route name the worker resolves against its own registry copy
    pub route_name: String,
    /// Pre-fetched render data (C3 output); `Null` when the route has no fetcher
    pub data: Value,
    /// Request body, present only for methods that carry one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Per-request context extracted by upstream middleware
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub locals: HashMap<String, Value>,
}

/// Render result shipped back from a worker (worker → main).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOutput {
    /// HTTP status code (100–599)
    pub status: u16,
    /// Status reason text
    pub reason: String,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Complete HTML document
    pub html: String,
    /// Worker-measured render duration in milliseconds
    pub duration_ms: u64,
    /// Identifier of the worker that produced this output; 0 means inline
    pub worker_id: u32,
    /// Present only when rendering failed and `html` is a synthetic 500 page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RenderOutput {
    pub fn new(status: u16, html: String, duration_ms: u64, worker_id: u32) -> Self {
        Self {
            status,
            reason: status_reason(status).to_string(),
            headers: HashMap::new(),
            html,
            duration_ms,
            worker_id,
            error: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

/// Request-shaped input reconstructed by a worker from a [`RenderTask`].
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub url: Url,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub locals: HashMap<String, Value>,
}

/// Assemble a [`RenderTask`] from a parsed request plus the dispatcher's
/// route decision and pre-fetched data.
///
/// Fails with `MalformedRequest` when no absolute URL can be formed, and
/// with `BodyConsumed` when the body was drained before assembly. The body
/// is carried only for methods that semantically have one.
pub fn assemble(
    req: &IncomingRequest,
    route_name: &str,
    data: Value,
    locals: HashMap<String, Value>,
) -> Result<RenderTask, DispatchError> {
    let url = req.absolute_url()?;

    let body = if req.method == Method::GET || req.method == Method::HEAD {
        None
    } else {
        match &req.body {
            RequestBody::Empty => None,
            RequestBody::Text(text) => Some(text.clone()),
            RequestBody::Consumed => return Err(DispatchError::BodyConsumed),
        }
    };

    Ok(RenderTask {
        url: url.to_string(),
        method: req.method.to_string(),
        headers: req.headers.clone(),
        route_name: route_name.to_string(),
        data,
        body,
        locals,
    })
}

/// Reconstruct the request-shaped input on the worker side.
///
/// The task URL was validated during assembly, so a parse failure here
/// means the task was corrupted in transit.
pub fn reconstruct(task: &RenderTask) -> Result<TaskRequest, DispatchError> {
    let url = Url::parse(&task.url)
        .map_err(|e| DispatchError::MalformedRequest(format!("{}: {e}", task.url)))?;
    let method = task
        .method
        .parse::<Method>()
        .map_err(|_| DispatchError::MalformedRequest(format!("bad method '{}'", task.method)))?;

    Ok(TaskRequest {
        url,
        method,
        headers: task.headers.clone(),
        body: task.body.clone(),
        locals: task.locals.clone(),
    })
}

/// Reason phrase for the status codes the dispatcher emits.
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "OK",
    }
}
