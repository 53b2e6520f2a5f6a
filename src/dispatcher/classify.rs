//! Hybrid classification heuristic: decides per request whether a render
//! runs inline or on a worker.
//!
//! Pure function of (mode, URL path, observed stats) — the same inputs
//! always yield the same decision, and the decision never changes during a
//! single request. Rules apply in order; the first match wins.

use crate::config::SsrMode;

use super::stats::RouteStat;

/// Where a render executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecPath {
    Inline,
    Worker,
}

/// Classification result plus the rule that produced it, for decision logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub path: ExecPath,
    pub rule: &'static str,
}

impl Decision {
    fn inline(rule: &'static str) -> Self {
        Self {
            path: ExecPath::Inline,
            rule,
        }
    }

    fn worker(rule: &'static str) -> Self {
        Self {
            path: ExecPath::Worker,
            rule,
        }
    }
}

/// Path of the pool introspection endpoint; always rendered inline so it
/// can read live pool state.
pub const METRICS_ENDPOINT_SUFFIX: &str = "/api/metrics";

/// Path of the results viewer, the one CPU-heavy page with a human behind it
const RESULTS_VIEWER_PATH: &str = "/results";

/// Observed-average thresholds for the fallback rule, in milliseconds
const FAST_INLINE_THRESHOLD_MS: f64 = 50.0;
const IO_BOUND_THRESHOLD_MS: f64 = 200.0;

/// Classify a request path under the given mode.
pub fn classify(mode: SsrMode, path: &str, stats: Option<RouteStat>) -> Decision {
    match mode {
        SsrMode::Traditional => Decision::inline("mode:traditional"),
        SsrMode::Worker => {
            if is_metrics_endpoint(path) {
                Decision::inline("metrics-endpoint")
            } else {
                Decision::worker("mode:worker")
            }
        }
        SsrMode::Hybrid => classify_hybrid(path, stats),
    }
}

fn classify_hybrid(path: &str, stats: Option<RouteStat>) -> Decision {
    if is_metrics_endpoint(path) {
        return Decision::inline("metrics-endpoint");
    }
    // Wait-bound routes: worker serialization cost exceeds any parallelism
    // gain, so keep them on the calling coroutine.
    if path.starts_with("/api/") || path.contains("api-heavy") || path.contains("mixed") {
        return Decision::inline("io-heavy");
    }
    if path.contains("cpu-intensive") || path == RESULTS_VIEWER_PATH {
        return Decision::worker("cpu-intensive");
    }
    if path == "/" || path.contains("simple") {
        return Decision::worker("simple");
    }

    match stats {
        None => Decision::worker("no-observation"),
        Some(stat) if stat.avg_ms < FAST_INLINE_THRESHOLD_MS => {
            Decision::inline("fast-by-observation")
        }
        Some(stat) if stat.avg_ms > IO_BOUND_THRESHOLD_MS => {
            Decision::inline("io-bound-by-observation")
        }
        Some(_) => Decision::worker("default-by-observation"),
    }
}

fn is_metrics_endpoint(path: &str) -> bool {
    path.ends_with(METRICS_ENDPOINT_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(avg_ms: f64) -> Option<RouteStat> {
        Some(RouteStat { count: 5, avg_ms })
    }

    #[test]
    fn test_traditional_is_always_inline() {
        for path in ["/", "/test/cpu-intensive", "/api/echo"] {
            assert_eq!(
                classify(SsrMode::Traditional, path, None).path,
                ExecPath::Inline
            );
        }
    }

    #[test]
    fn test_worker_mode_is_worker_except_metrics() {
        assert_eq!(
            classify(SsrMode::Worker, "/test/simple", None).path,
            ExecPath::Worker
        );
        assert_eq!(
            classify(SsrMode::Worker, "/api/metrics", None).path,
            ExecPath::Inline
        );
    }

    #[test]
    fn test_hybrid_metrics_endpoint_inline() {
        let d = classify(SsrMode::Hybrid, "/api/metrics", None);
        assert_eq!(d.path, ExecPath::Inline);
        assert_eq!(d.rule, "metrics-endpoint");
    }

    #[test]
    fn test_hybrid_io_heavy_inline() {
        assert_eq!(classify(SsrMode::Hybrid, "/api/echo", None).rule, "io-heavy");
        assert_eq!(
            classify(SsrMode::Hybrid, "/test/api-heavy", None).rule,
            "io-heavy"
        );
        assert_eq!(classify(SsrMode::Hybrid, "/test/mixed", None).rule, "io-heavy");
    }

    #[test]
    fn test_hybrid_cpu_to_worker() {
        let d = classify(SsrMode::Hybrid, "/test/cpu-intensive", None);
        assert_eq!(d.path, ExecPath::Worker);
        assert_eq!(d.rule, "cpu-intensive");
        assert_eq!(
            classify(SsrMode::Hybrid, "/results", None).path,
            ExecPath::Worker
        );
    }

    #[test]
    fn test_hybrid_simple_to_worker() {
        assert_eq!(classify(SsrMode::Hybrid, "/", None).rule, "simple");
        assert_eq!(
            classify(SsrMode::Hybrid, "/test/simple", None).path,
            ExecPath::Worker
        );
    }

    #[test]
    fn test_hybrid_stats_fallback() {
        let path = "/pages/product";
        assert_eq!(classify(SsrMode::Hybrid, path, None).rule, "no-observation");
        assert_eq!(
            classify(SsrMode::Hybrid, path, stat(20.0)).path,
            ExecPath::Inline
        );
        assert_eq!(
            classify(SsrMode::Hybrid, path, stat(350.0)).path,
            ExecPath::Inline
        );
        assert_eq!(
            classify(SsrMode::Hybrid, path, stat(120.0)).path,
            ExecPath::Worker
        );
    }

    #[test]
    fn test_boundary_values_route_to_worker() {
        // 50 and 200 are not strictly below/above the thresholds.
        let path = "/pages/product";
        assert_eq!(
            classify(SsrMode::Hybrid, path, stat(50.0)).path,
            ExecPath::Worker
        );
        assert_eq!(
            classify(SsrMode::Hybrid, path, stat(200.0)).path,
            ExecPath::Worker
        );
    }

    #[test]
    fn test_classification_is_stable() {
        // Same inputs, same decision, every time.
        for path in ["/", "/api/x", "/pages/p", "/test/cpu-intensive"] {
            let first = classify(SsrMode::Hybrid, path, stat(100.0));
            for _ in 0..10 {
                assert_eq!(classify(SsrMode::Hybrid, path, stat(100.0)), first);
            }
        }
    }

    #[test]
    fn test_first_matching_rule_wins() {
        // "mixed" substring is checked before the CPU rule, so a path with
        // both markers goes inline.
        let d = classify(SsrMode::Hybrid, "/test/mixed-cpu-intensive", None);
        assert_eq!(d.path, ExecPath::Inline);
        assert_eq!(d.rule, "io-heavy");
    }
}
