use serde_json::Value;
use ssr_dispatch::registry::{
    load_registry, RegistryBuilder, RenderContext, RouteDefinition, WorkloadKind,
};

fn html_a(_data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    Ok("<html>a</html>".to_string())
}

fn html_b(_data: &Value, _ctx: &RenderContext) -> anyhow::Result<String> {
    Ok("<html>b</html>".to_string())
}

/// Route match is order-deterministic: for any path both patterns match,
/// the first registered wins — in both registration orders.
#[test]
fn test_match_order_determinism() {
    let ab = RegistryBuilder::new()
        .route(RouteDefinition::new("A", r"^/x/.*$", html_a))
        .route(RouteDefinition::new("B", r"^/x/y$", html_b))
        .build();
    let ba = RegistryBuilder::new()
        .route(RouteDefinition::new("B", r"^/x/y$", html_b))
        .route(RouteDefinition::new("A", r"^/x/.*$", html_a))
        .build();

    for path in ["/x/y", "/x/anything", "/x/"] {
        if let Some(m) = ab.match_path(path) {
            assert_eq!(m.route.name, "A", "first-registered must win for {path}");
        }
    }
    assert_eq!(ba.match_path("/x/y").unwrap().route.name, "B");
    assert_eq!(ba.match_path("/x/z").unwrap().route.name, "A");
}

#[test]
fn test_worker_and_main_registry_loads_agree() {
    // The worker resolves by name against its own copy; every name in the
    // main load must resolve identically in a fresh load.
    let main_load = load_registry();
    let worker_load = load_registry();

    for route in main_load.routes() {
        let resolved = worker_load
            .resolve(route.name)
            .unwrap_or_else(|| panic!("route '{}' missing in worker load", route.name));
        assert_eq!(resolved.pattern.as_str(), route.pattern.as_str());
        assert_eq!(resolved.workload, route.workload);
        assert_eq!(resolved.fetcher.is_some(), route.fetcher.is_some());
    }
}

#[test]
fn test_builtin_workload_metadata() {
    let registry = load_registry();
    assert_eq!(
        registry.resolve("CpuIntensive").unwrap().workload,
        WorkloadKind::CpuIntensive
    );
    assert_eq!(
        registry.resolve("ApiHeavy").unwrap().workload,
        WorkloadKind::IoHeavy
    );
    assert_eq!(
        registry.resolve("Mixed").unwrap().workload,
        WorkloadKind::Mixed
    );
}

#[test]
fn test_query_string_is_not_part_of_the_pattern() {
    let registry = load_registry();
    // Matching happens on the bare path; the dispatcher strips the query.
    assert!(registry.match_path("/test/simple").is_some());
    assert!(registry.match_path("/test/simple?x=1").is_none());
}
