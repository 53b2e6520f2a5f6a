use may_minihttp::Response;
use serde_json::Value;

use crate::dispatcher::Reply;
use crate::task::status_reason;

/// Write a dispatcher reply onto the wire.
///
/// `may_minihttp` headers are static strings, so the handful of headers
/// this server actually emits are mapped to fixed lines here; the body is
/// sniffed for JSON so API-shaped routes get a sensible content type.
pub fn write_reply(res: &mut Response, reply: &Reply) {
    res.status_code(reply.status as usize, status_reason(reply.status));

    if looks_like_json(&reply.html) {
        res.header("Content-Type: application/json");
    } else {
        res.header("Content-Type: text/html; charset=utf-8");
    }

    match reply.render_path() {
        Some("worker") => {
            res.header("X-Render-Path: worker");
        }
        Some("fallback") => {
            res.header("X-Render-Path: fallback");
        }
        _ => {
            res.header("X-Render-Path: inline");
        }
    }

    res.body_vec(reply.html.clone().into_bytes());
}

/// Write a JSON document with `Cache-Control: no-cache` (introspection
/// endpoints must never be cached by the benchmark client).
pub fn write_json_no_cache(res: &mut Response, status: u16, body: &Value) {
    res.status_code(status as usize, status_reason(status));
    res.header("Content-Type: application/json");
    res.header("Cache-Control: no-cache");
    res.body_vec(serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec()));
}

fn looks_like_json(body: &str) -> bool {
    matches!(body.trim_start().as_bytes().first(), Some(b'{') | Some(b'['))
}
