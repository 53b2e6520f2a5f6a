//! # Dispatch Configuration Module
//!
//! Environment variable-based configuration for the render dispatcher.
//!
//! ## Environment Variables
//!
//! ### `SSR_MODE`
//!
//! Selects the execution strategy for page renders:
//! - `traditional` — every render runs inline on the request coroutine
//! - `worker` — every render is submitted to the worker pool
//! - `hybrid` — per-request classification decides between the two
//!
//! Default: `traditional`. Unknown values fall back to the default.
//!
//! ### `SSR_DEBUG`
//!
//! `true` enables per-request mode-decision logging at debug level.
//! Default: `false`.
//!
//! ### `PORT` / `HOST`
//!
//! Bind address for the HTTP boundary. Defaults: `4321` / `0.0.0.0`.
//!
//! ### `WORKER_THREADS`
//!
//! If set to a positive integer, overrides the detected CPU count used to
//! size the worker pool (see [`crate::cpu`]).
//!
//! ## Usage
//!
//! ```rust
//! use ssr_dispatch::config::DispatchConfig;
//!
//! let config = DispatchConfig::from_env();
//! println!("mode: {}", config.mode);
//! ```

use std::env;
use std::fmt;
use std::str::FromStr;

/// Execution strategy for page renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsrMode {
    /// Render inline on the request coroutine
    Traditional,
    /// Offload every render to the worker pool
    Worker,
    /// Classify per request between inline and worker execution
    Hybrid,
}

impl SsrMode {
    /// Whether this mode ever submits tasks to the worker pool
    pub fn uses_pool(&self) -> bool {
        !matches!(self, SsrMode::Traditional)
    }
}

impl Default for SsrMode {
    fn default() -> Self {
        SsrMode::Traditional
    }
}

impl FromStr for SsrMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "traditional" => Ok(SsrMode::Traditional),
            "worker" => Ok(SsrMode::Worker),
            "hybrid" => Ok(SsrMode::Hybrid),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SsrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SsrMode::Traditional => "traditional",
            SsrMode::Worker => "worker",
            SsrMode::Hybrid => "hybrid",
        };
        write!(f, "{s}")
    }
}

/// Process-level configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Execution strategy (default: traditional)
    pub mode: SsrMode,
    /// Per-request decision logging (default: false)
    pub debug: bool,
    /// Bind host for the HTTP boundary (default: 0.0.0.0)
    pub host: String,
    /// Bind port for the HTTP boundary (default: 4321)
    pub port: u16,
    /// Override for the detected CPU count, if set and positive
    pub worker_threads: Option<usize>,
}

impl DispatchConfig {
    /// Load configuration from environment variables.
    ///
    /// Unknown or unparseable values use the documented defaults.
    pub fn from_env() -> Self {
        let mode = env::var("SSR_MODE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let debug = env::var("SSR_DEBUG")
            .map(|v| v == "true")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4321);

        let worker_threads = env::var("WORKER_THREADS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&n| n > 0);

        Self {
            mode,
            debug,
            host,
            port,
            worker_threads,
        }
    }

    /// Bind address string for the HTTP boundary
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: SsrMode::Traditional,
            debug: false,
            host: "0.0.0.0".to_string(),
            port: 4321,
            worker_threads: None,
        }
    }
}
