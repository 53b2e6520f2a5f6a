use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use super::Middleware;
use crate::dispatcher::{Reply, RENDER_PATH_HEADER};
use crate::ids::RequestId;
use crate::task::IncomingRequest;

/// Local key under which the correlation id travels with the request
pub const REQUEST_ID_LOCAL: &str = "request_id";

/// Middleware that assigns a correlation id and logs request completion.
///
/// The id is taken from an incoming `x-request-id` header when present and
/// deposited into the request locals, so renderers on either tier can put
/// it in their output.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn before(
        &self,
        req: &IncomingRequest,
        locals: &mut HashMap<String, Value>,
    ) -> Option<Reply> {
        let request_id =
            RequestId::from_header_or_new(req.headers.get("x-request-id").map(String::as_str));
        debug!(
            request_id = %request_id,
            method = %req.method,
            path = %req.path,
            "Request received"
        );
        locals.insert(
            REQUEST_ID_LOCAL.to_string(),
            Value::String(request_id.to_string()),
        );
        None
    }

    fn after(&self, req: &IncomingRequest, res: &mut Reply, latency: Duration) {
        info!(
            method = %req.method,
            path = %req.path,
            status = res.status,
            render_path = res
                .headers
                .get(RENDER_PATH_HEADER)
                .map(String::as_str)
                .unwrap_or("inline"),
            latency_ms = latency.as_millis() as u64,
            "Request complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::RequestBody;
    use http::Method;

    #[test]
    fn test_request_id_deposited_in_locals() {
        let req = IncomingRequest {
            method: Method::GET,
            path: "/".to_string(),
            headers: HashMap::new(),
            body: RequestBody::Empty,
        };
        let mut locals = HashMap::new();
        assert!(TracingMiddleware.before(&req, &mut locals).is_none());
        assert!(locals.contains_key(REQUEST_ID_LOCAL));
    }

    #[test]
    fn test_incoming_request_id_preserved() {
        let id = RequestId::new().to_string();
        let mut headers = HashMap::new();
        headers.insert("x-request-id".to_string(), id.clone());
        let req = IncomingRequest {
            method: Method::GET,
            path: "/".to_string(),
            headers,
            body: RequestBody::Empty,
        };
        let mut locals = HashMap::new();
        TracingMiddleware.before(&req, &mut locals);
        assert_eq!(locals[REQUEST_ID_LOCAL], Value::String(id));
    }
}
