use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use http::Method;
use serde_json::{json, Value};
use ssr_dispatch::config::SsrMode;
use ssr_dispatch::dispatcher::RenderDispatcher;
use ssr_dispatch::pool::{PoolConfig, WorkerPool};
use ssr_dispatch::registry::{
    FetchContext, RegistryBuilder, RenderContext, RouteDefinition, RouteRegistry,
};
use ssr_dispatch::task::{IncomingRequest, RequestBody};
use url::Url;

fn simple_renderer(_data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    Ok("<!DOCTYPE html><html><body>ok</body></html>".to_string())
}

fn echo_renderer(data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    Ok(serde_json::to_string(data)?)
}

fn echo_fetcher(_url: &Url, _ctx: &FetchContext) -> anyhow::Result<Value> {
    Ok(json!({"ok": true}))
}

fn failing_fetcher(_url: &Url, _ctx: &FetchContext) -> anyhow::Result<Value> {
    anyhow::bail!("upstream is down")
}

fn boom_renderer(_data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    anyhow::bail!("boom")
}

fn slow_renderer(_data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    let end = Instant::now() + Duration::from_millis(200);
    while Instant::now() < end {
        std::hint::spin_loop();
    }
    Ok("<html><body>slow</body></html>".to_string())
}

fn page_renderer(_data: &Value, ctx: &RenderContext) -> anyhow::Result<String> {
    Ok(format!("<html><body>{}</body></html>", ctx.path))
}

fn test_registry() -> RouteRegistry {
    RegistryBuilder::new()
        .route(RouteDefinition::new("Simple", r"^/test/simple$", simple_renderer))
        .route(RouteDefinition::new("Echo", r"^/api/echo$", echo_renderer).with_fetcher(echo_fetcher))
        .route(RouteDefinition::new(
            "CpuIntensive",
            r"^/test/cpu-intensive$",
            simple_renderer,
        ))
        .route(
            RouteDefinition::new("Broken", r"^/test/broken$", simple_renderer)
                .with_fetcher(failing_fetcher),
        )
        .route(RouteDefinition::new("Boom", r"^/test/boom$", boom_renderer))
        .route(RouteDefinition::new("Slow", r"^/test/slow$", slow_renderer))
        .route(RouteDefinition::new("Pages", r"^/pages/.*$", page_renderer))
        .build()
}

fn get(path: &str) -> IncomingRequest {
    let mut headers = HashMap::new();
    headers.insert("host".to_string(), "localhost:4321".to_string());
    IncomingRequest {
        method: Method::GET,
        path: path.to_string(),
        headers,
        body: RequestBody::Empty,
    }
}

fn traditional_dispatcher() -> RenderDispatcher {
    RenderDispatcher::new(Arc::new(test_registry()), SsrMode::Traditional)
}

fn pooled_dispatcher(mode: SsrMode, workers: usize) -> RenderDispatcher {
    let pool = Arc::new(WorkerPool::new(PoolConfig::fixed(workers), test_registry));
    pool.initialize().unwrap();
    RenderDispatcher::new(Arc::new(test_registry()), mode).with_pool(pool)
}

/// Scenario: simple route under traditional mode renders inline.
#[test]
fn test_traditional_simple_route_inline() {
    let dispatcher = traditional_dispatcher();
    let reply = dispatcher.handle(&get("/test/simple"));

    assert_eq!(reply.status, 200);
    assert_eq!(reply.html, "<!DOCTYPE html><html><body>ok</body></html>");
    assert_eq!(reply.render_path(), Some("inline"));
}

/// Scenario: worker mode sends every render through the pool.
#[test]
fn test_worker_mode_dispatches_to_pool() {
    let dispatcher = pooled_dispatcher(SsrMode::Worker, 2);

    for _ in 0..10 {
        let reply = dispatcher.handle(&get("/test/simple"));
        assert_eq!(reply.status, 200);
        assert_eq!(reply.html, "<!DOCTYPE html><html><body>ok</body></html>");
        assert_eq!(reply.render_path(), Some("worker"));
        let worker_id: u32 = reply.headers.get("x-worker-id").unwrap().parse().unwrap();
        assert!(worker_id >= 1);
    }

    let pool = dispatcher.pool().unwrap();
    assert_eq!(pool.metrics().completed, 10);
    pool.shutdown();
}

/// Scenario: queue-full burst falls back inline; every request still
/// returns 200.
#[test]
fn test_queue_full_falls_back_inline() {
    let dispatcher = Arc::new(pooled_dispatcher(SsrMode::Worker, 1));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let dispatcher = dispatcher.clone();
        handles.push(thread::spawn(move || dispatcher.handle(&get("/test/slow"))));
    }

    let mut fallbacks = 0usize;
    for handle in handles {
        let reply = handle.join().unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.html, "<html><body>slow</body></html>");
        if reply.render_path() == Some("fallback") {
            fallbacks += 1;
        }
    }
    assert!(fallbacks >= 1, "at least one render must be served inline");

    dispatcher.pool().unwrap().shutdown();
}

/// Scenario: hybrid classification keeps API paths inline.
#[test]
fn test_hybrid_api_path_runs_inline() {
    let dispatcher = pooled_dispatcher(SsrMode::Hybrid, 2);

    let reply = dispatcher.handle(&get("/api/echo"));
    assert_eq!(reply.status, 200);
    assert_eq!(reply.html, "{\"ok\":true}");
    assert_eq!(reply.render_path(), Some("inline"));

    dispatcher.pool().unwrap().shutdown();
}

/// Scenario: hybrid classification sends CPU paths to a worker.
#[test]
fn test_hybrid_cpu_path_runs_on_worker() {
    let dispatcher = pooled_dispatcher(SsrMode::Hybrid, 2);

    let reply = dispatcher.handle(&get("/test/cpu-intensive"));
    assert_eq!(reply.status, 200);
    assert_eq!(reply.render_path(), Some("worker"));
    let worker_id: u32 = reply.headers.get("x-worker-id").unwrap().parse().unwrap();
    assert!((1..=2).contains(&worker_id));

    dispatcher.pool().unwrap().shutdown();
}

/// Scenario: renderer error surfaces as a 500 page; the pool stays healthy.
#[test]
fn test_renderer_error_produces_500_page_pool_healthy() {
    let dispatcher = pooled_dispatcher(SsrMode::Worker, 1);

    let reply = dispatcher.handle(&get("/test/boom"));
    assert_eq!(reply.status, 500);
    assert!(reply.html.contains("boom"));
    assert!(reply.html.starts_with("<!DOCTYPE html>"));

    let pool = dispatcher.pool().unwrap();
    assert!(pool.is_healthy());
    pool.shutdown();
}

#[test]
fn test_unmatched_path_is_404_html() {
    let dispatcher = traditional_dispatcher();
    let reply = dispatcher.handle(&get("/missing"));
    assert_eq!(reply.status, 404);
    assert!(reply.html.starts_with("<!DOCTYPE html>"));
    assert!(reply.html.contains("/missing"));
}

#[test]
fn test_data_fetch_failure_is_500_page_with_message() {
    let dispatcher = traditional_dispatcher();
    let reply = dispatcher.handle(&get("/test/broken"));
    assert_eq!(reply.status, 500);
    assert!(reply.html.contains("upstream is down"));
    assert!(reply.html.starts_with("<!DOCTYPE html>"));
}

#[test]
fn test_stats_evict_beyond_100_urls() {
    let dispatcher = traditional_dispatcher();
    for i in 0..101 {
        let reply = dispatcher.handle(&get(&format!("/pages/{i}")));
        assert_eq!(reply.status, 200);
    }
    assert_eq!(dispatcher.tracked_urls(), 100);
    assert!(dispatcher.url_stat("/pages/0").is_none());
    assert!(dispatcher.url_stat("/pages/100").is_some());
}

/// An unclassified URL starts on the worker path, then moves inline once
/// its observed average proves it cheap.
#[test]
fn test_hybrid_observation_moves_fast_route_inline() {
    let dispatcher = pooled_dispatcher(SsrMode::Hybrid, 2);

    let first = dispatcher.handle(&get("/pages/cheap"));
    assert_eq!(first.render_path(), Some("worker"));

    // The page renders in well under 50 ms, so the rolling average drops
    // below the inline threshold after the first observation.
    let second = dispatcher.handle(&get("/pages/cheap"));
    assert_eq!(second.render_path(), Some("inline"));

    dispatcher.pool().unwrap().shutdown();
}
