//! Render stage: invokes a route's renderer and times it.
//!
//! Usable both inline on the request coroutine and inside a worker thread.
//! Renderers are pure by contract — they get their data pre-fetched and must
//! not perform I/O; one that does will simply block its executor. A failing
//! or panicking renderer never propagates: the stage synthesizes a complete,
//! well-formed 500 document instead, so callers always end up with a full
//! HTML page.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error};

use crate::registry::{RenderContext, RouteDefinition};

/// Result of one render invocation
#[derive(Debug)]
pub enum RenderOutcome {
    Ok {
        html: String,
        duration_ms: u64,
    },
    /// Renderer returned an error or panicked; `page` is a synthetic 500
    /// document embedding the message.
    Failed {
        page: String,
        message: String,
        duration_ms: u64,
    },
}

/// Run a route's renderer over pre-fetched data.
pub fn render_route(route: &RouteDefinition, data: &Value, ctx: &RenderContext) -> RenderOutcome {
    let start = Instant::now();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        (route.renderer)(data, ctx)
    }));

    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(html)) => {
            debug!(
                route = route.name,
                duration_ms,
                worker_id = ctx.worker_id,
                "Render complete"
            );
            RenderOutcome::Ok { html, duration_ms }
        }
        Ok(Err(err)) => {
            let message = err.to_string();
            error!(
                route = route.name,
                error = %message,
                worker_id = ctx.worker_id,
                "Renderer returned error"
            );
            let detail = format!("{err:?}");
            RenderOutcome::Failed {
                page: error_page(500, "Render Failed", &message, Some(&detail)),
                message,
                duration_ms,
            }
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            let backtrace = std::backtrace::Backtrace::capture();
            error!(
                route = route.name,
                panic_message = %message,
                worker_id = ctx.worker_id,
                "Renderer panicked"
            );
            RenderOutcome::Failed {
                page: error_page(500, "Render Failed", &message, Some(&backtrace.to_string())),
                message,
                duration_ms,
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "renderer panicked".to_string()
    }
}

/// Escape a string for embedding in HTML text or attribute position.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Synthesize a self-contained error document.
///
/// The message and detail are escaped, so the page parses as valid HTML
/// whatever the renderer put in its error.
pub fn error_page(status: u16, title: &str, message: &str, detail: Option<&str>) -> String {
    let detail_block = detail
        .map(|d| format!("<pre>{}</pre>", escape_html(d)))
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{status} {title}</title></head>\n\
         <body>\n<h1>{status} {title}</h1>\n<p>{}</p>\n{detail_block}</body>\n</html>",
        escape_html(message),
        status = status,
        title = escape_html(title),
        detail_block = detail_block,
    )
}

/// Generic 404 body for unmatched paths
pub fn not_found_page(path: &str) -> String {
    error_page(404, "Not Found", &format!("No route matches {path}"), None)
}
