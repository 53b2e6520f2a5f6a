//! Route registry: the ordered, frozen table of renderable routes.
//!
//! Matching is linear first-hit in registration order, so callers register
//! more specific patterns before general ones. The registry is built once
//! during process init and identically loaded in every worker — route names
//! are the only thing a worker resolves against, which makes the identical
//! load a correctness requirement, not an optimization.

use std::collections::HashMap;

use http::Method;
use regex::Regex;
use serde_json::Value;
use tracing::info;
use url::Url;

/// Workload classification metadata attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Simple,
    IoHeavy,
    CpuIntensive,
    Mixed,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Simple => "simple",
            WorkloadKind::IoHeavy => "io-heavy",
            WorkloadKind::CpuIntensive => "cpu-intensive",
            WorkloadKind::Mixed => "mixed",
        }
    }
}

/// Context handed to a data fetcher along with the request URL.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    pub method: Option<Method>,
    pub headers: HashMap<String, String>,
    /// Named captures from the route pattern
    pub params: HashMap<String, String>,
    pub locals: HashMap<String, Value>,
}

/// Context handed to a renderer along with the pre-fetched data.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub route_name: String,
    /// Request path, without query string
    pub path: String,
    /// Named captures from the route pattern
    pub params: HashMap<String, String>,
    pub locals: HashMap<String, Value>,
    /// Identifier of the executing worker; 0 when rendering inline
    pub worker_id: u32,
}

/// Pure CPU transform from pre-fetched data to a complete HTML document.
///
/// Plain function pointers keep the table identical in every registry load,
/// so a route name resolves to the same handler in the main tier and in
/// every worker without transporting closures across threads.
pub type RendererFn = fn(&Value, &RenderContext) -> anyhow::Result<String>;

/// I/O step producing a renderer's input; runs on the caller thread only.
pub type FetcherFn = fn(&Url, &FetchContext) -> anyhow::Result<Value>;

/// Function that builds the process's route registry. Workers call the same
/// loader during warmup, giving each an independent identical copy.
pub type RegistryLoader = fn() -> RouteRegistry;

/// A single registered route
pub struct RouteDefinition {
    /// Stable name, unique across the registry
    pub name: &'static str,
    /// Anchored pattern with optional named captures
    pub pattern: Regex,
    /// Optional I/O stage
    pub fetcher: Option<FetcherFn>,
    /// CPU stage
    pub renderer: RendererFn,
    /// Workload classification hint
    pub workload: WorkloadKind,
    /// Estimated render time hint in milliseconds
    pub estimated_ms: Option<u64>,
}

impl RouteDefinition {
    /// Create a route from an anchored pattern string.
    ///
    /// Patterns are compiled at process init; an invalid pattern is a
    /// programming error and panics immediately rather than at match time.
    pub fn new(name: &'static str, pattern: &str, renderer: RendererFn) -> Self {
        let pattern = Regex::new(pattern).expect("failed to compile route pattern");
        Self {
            name,
            pattern,
            fetcher: None,
            renderer,
            workload: WorkloadKind::Simple,
            estimated_ms: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: FetcherFn) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_workload(mut self, workload: WorkloadKind) -> Self {
        self.workload = workload;
        self
    }

    pub fn with_estimate(mut self, estimated_ms: u64) -> Self {
        self.estimated_ms = Some(estimated_ms);
        self
    }
}

impl std::fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("workload", &self.workload)
            .field("has_fetcher", &self.fetcher.is_some())
            .finish()
    }
}

/// Result of matching a path against the registry
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a RouteDefinition,
    /// Named captures extracted from the path
    pub params: HashMap<String, String>,
}

/// Ordered, immutable collection of route definitions.
///
/// Built through [`RegistryBuilder`] during process init and frozen from
/// then on; there is no way to register a route on a built registry.
pub struct RouteRegistry {
    routes: Vec<RouteDefinition>,
    by_name: HashMap<&'static str, usize>,
}

impl RouteRegistry {
    /// Match a request path (no query string) against the registry.
    ///
    /// Linear scan, first hit in registration order wins.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch<'_>> {
        for route in &self.routes {
            if let Some(caps) = route.pattern.captures(path) {
                let mut params = HashMap::new();
                for name in route.pattern.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        params.insert(name.to_string(), m.as_str().to_string());
                    }
                }
                return Some(RouteMatch { route, params });
            }
        }
        None
    }

    /// Resolve a route by its stable name (the worker-side lookup).
    pub fn resolve(&self, name: &str) -> Option<&RouteDefinition> {
        self.by_name.get(name).map(|&idx| &self.routes[idx])
    }

    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Builder consumed by `build()`; routes cannot be added afterwards.
#[derive(Default)]
pub struct RegistryBuilder {
    routes: Vec<RouteDefinition>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. Order is significant: earlier routes win ties.
    pub fn route(mut self, def: RouteDefinition) -> Self {
        self.routes.push(def);
        self
    }

    /// Freeze the registry. Duplicate route names are a programming error
    /// caught here, at process init.
    pub fn build(self) -> RouteRegistry {
        let mut by_name = HashMap::with_capacity(self.routes.len());
        for (idx, route) in self.routes.iter().enumerate() {
            let previous = by_name.insert(route.name, idx);
            assert!(
                previous.is_none(),
                "duplicate route name '{}' in registry",
                route.name
            );
        }

        info!(
            routes_count = self.routes.len(),
            "Route registry frozen"
        );

        RouteRegistry {
            routes: self.routes,
            by_name,
        }
    }
}
