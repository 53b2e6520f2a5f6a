//! Builtin route set: the workloads the benchmark harness drives.
//!
//! Every entry is a plain function, so `load_registry` produces an
//! identical table in the main process and in every worker. The three
//! `/test/*` routes cover the workload classes the hybrid classifier
//! distinguishes; `/api/echo` exercises the I/O-heavy inline path and the
//! results viewer is the one CPU-heavy page a human actually opens.

use std::collections::HashMap;

use serde_json::{json, Value};
use url::Url;

use crate::mock_api;
use crate::render::escape_html;

use super::core::{
    FetchContext, RegistryBuilder, RenderContext, RouteDefinition, RouteRegistry, WorkloadKind,
};

/// Build the process route registry. Workers call this during warmup.
pub fn load_registry() -> RouteRegistry {
    RegistryBuilder::new()
        .route(
            RouteDefinition::new("Home", r"^/$", render_home)
                .with_workload(WorkloadKind::Simple)
                .with_estimate(1),
        )
        .route(
            RouteDefinition::new("Simple", r"^/test/simple$", render_simple)
                .with_workload(WorkloadKind::Simple)
                .with_estimate(1),
        )
        .route(
            RouteDefinition::new("CpuIntensive", r"^/test/cpu-intensive$", render_cpu_intensive)
                .with_workload(WorkloadKind::CpuIntensive)
                .with_estimate(80),
        )
        .route(
            RouteDefinition::new("ApiHeavy", r"^/test/api-heavy$", render_api_heavy)
                .with_fetcher(fetch_api_heavy)
                .with_workload(WorkloadKind::IoHeavy)
                .with_estimate(30),
        )
        .route(
            RouteDefinition::new("Mixed", r"^/test/mixed$", render_mixed)
                .with_fetcher(fetch_mixed)
                .with_workload(WorkloadKind::Mixed)
                .with_estimate(40),
        )
        .route(
            RouteDefinition::new("Echo", r"^/api/echo$", render_echo)
                .with_fetcher(fetch_echo)
                .with_workload(WorkloadKind::IoHeavy),
        )
        .route(
            RouteDefinition::new("Results", r"^/results$", render_results)
                .with_workload(WorkloadKind::CpuIntensive)
                .with_estimate(60),
        )
        .build()
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{}</title></head>\n<body>\n{}\n</body>\n</html>",
        escape_html(title),
        body
    )
}

fn render_home(_data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    let body = "<h1>SSR Dispatch</h1>\n<ul>\n\
        <li><a href=\"/test/simple\">simple</a></li>\n\
        <li><a href=\"/test/cpu-intensive\">cpu-intensive</a></li>\n\
        <li><a href=\"/test/api-heavy\">api-heavy</a></li>\n\
        <li><a href=\"/test/mixed\">mixed</a></li>\n\
        <li><a href=\"/results\">results</a></li>\n\
        </ul>";
    Ok(page("SSR Dispatch", body))
}

fn render_simple(_data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    Ok(page("Simple", "<h1>Simple page</h1>\n<p>No data fetch, trivial render.</p>"))
}

/// Deterministic arithmetic mix used by the CPU-bound workloads.
fn cpu_work(iterations: u64) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for i in 0..iterations {
        h = (h ^ i).wrapping_mul(0x0000_0100_0000_01b3);
        h ^= h >> 33;
    }
    h
}

fn render_cpu_intensive(_data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    // Output depends only on the data, so worker and inline renders agree
    // byte for byte.
    let mut rows = String::new();
    for block in 0..16u64 {
        let digest = cpu_work(250_000 + block * 1_000);
        rows.push_str(&format!(
            "<tr><td>{block}</td><td>{digest:016x}</td></tr>\n"
        ));
    }
    let body = format!("<h1>CPU-intensive page</h1>\n<table>\n{rows}</table>");
    Ok(page("CPU Intensive", &body))
}

fn fetch_api_heavy(_url: &Url, _ctx: &FetchContext) -> anyhow::Result<Value> {
    // Three upstream calls; wait-bound, which is why the classifier keeps
    // this route inline.
    Ok(json!({
        "users": mock_api::users(),
        "posts": mock_api::posts(10),
        "catalog": mock_api::catalog(),
    }))
}

fn render_api_heavy(data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    let users = data["users"].as_array().map(Vec::len).unwrap_or(0);
    let posts = data["posts"].as_array().map(Vec::len).unwrap_or(0);
    let products = data["catalog"]["products"]
        .as_array()
        .map(Vec::len)
        .unwrap_or(0);
    let body = format!(
        "<h1>API-heavy page</h1>\n<ul>\n<li>{users} users</li>\n\
         <li>{posts} posts</li>\n<li>{products} products</li>\n</ul>"
    );
    Ok(page("API Heavy", &body))
}

fn fetch_mixed(_url: &Url, _ctx: &FetchContext) -> anyhow::Result<Value> {
    Ok(json!({ "posts": mock_api::posts(20) }))
}

fn render_mixed(data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    let digest = cpu_work(500_000);
    let mut items = String::new();
    if let Some(posts) = data["posts"].as_array() {
        for post in posts {
            items.push_str(&format!(
                "<li>{} ({} words)</li>\n",
                escape_html(post["title"].as_str().unwrap_or("untitled")),
                post["words"]
            ));
        }
    }
    let body = format!(
        "<h1>Mixed page</h1>\n<p>digest {digest:016x}</p>\n<ul>\n{items}</ul>"
    );
    Ok(page("Mixed", &body))
}

fn fetch_echo(url: &Url, ctx: &FetchContext) -> anyhow::Result<Value> {
    let query: HashMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Ok(json!({
        "ok": true,
        "query": query,
        "params": ctx.params,
    }))
}

fn render_echo(data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    Ok(serde_json::to_string(data)?)
}

fn render_results(_data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    // The benchmark harness writes result JSON files next to the server;
    // this page is the viewer shell that loads and charts them client-side.
    let body = "<h1>Benchmark results</h1>\n\
        <div id=\"results\">Loading&hellip;</div>\n\
        <script>\n\
        fetch('/api/metrics').then(function (r) { return r.json(); }).then(function (m) {\n\
          document.getElementById('results').textContent = JSON.stringify(m, null, 2);\n\
        });\n\
        </script>";
    Ok(page("Results", body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_identically() {
        let a = load_registry();
        let b = load_registry();
        assert_eq!(a.len(), b.len());
        for (ra, rb) in a.routes().iter().zip(b.routes().iter()) {
            assert_eq!(ra.name, rb.name);
            assert_eq!(ra.pattern.as_str(), rb.pattern.as_str());
        }
    }

    #[test]
    fn test_builtin_paths_match() {
        let registry = load_registry();
        assert_eq!(registry.match_path("/").unwrap().route.name, "Home");
        assert_eq!(
            registry.match_path("/test/simple").unwrap().route.name,
            "Simple"
        );
        assert_eq!(
            registry.match_path("/test/cpu-intensive").unwrap().route.name,
            "CpuIntensive"
        );
        assert_eq!(registry.match_path("/api/echo").unwrap().route.name, "Echo");
        assert!(registry.match_path("/unknown").is_none());
    }

    #[test]
    fn test_cpu_work_deterministic() {
        assert_eq!(cpu_work(1000), cpu_work(1000));
        assert_ne!(cpu_work(1000), cpu_work(1001));
    }

    #[test]
    fn test_echo_renderer_is_json_of_data() {
        let data = json!({"ok": true});
        let html = render_echo(&data, &RenderContext::default()).unwrap();
        assert_eq!(html, "{\"ok\":true}");
    }

    #[test]
    fn test_renderers_produce_complete_documents() {
        let registry = load_registry();
        let ctx = RenderContext::default();
        for route in registry.routes() {
            if route.name == "Echo" {
                continue; // JSON body by design
            }
            let html = (route.renderer)(&sample_data(route.name), &ctx).unwrap();
            assert!(html.starts_with("<!DOCTYPE html>"), "{}", route.name);
            assert!(html.ends_with("</html>"), "{}", route.name);
        }
    }

    fn sample_data(route: &str) -> Value {
        match route {
            "ApiHeavy" => json!({
                "users": [], "posts": [], "catalog": { "products": [] }
            }),
            "Mixed" => json!({ "posts": [] }),
            _ => Value::Null,
        }
    }
}
