//! Error types shared across the dispatch pipeline.
//!
//! Every failure the dispatcher can produce is a variant here; the HTTP
//! boundary maps variants to status codes via [`DispatchError::status_code`].
//! `QueueFull` is cooperative and never reaches a client — the dispatcher
//! falls back to inline rendering when it sees one.

use thiserror::Error;

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors distinguished by the render dispatch core
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No registered route pattern matches the request path
    #[error("no route matches '{path}'")]
    NotFound {
        /// Path that failed to match
        path: String,
    },

    /// The route's data fetcher returned or threw an error
    #[error("data fetch failed for route '{route}': {message}")]
    DataFetchFailed {
        /// Route whose fetcher failed
        route: String,
        /// Original fetcher error message
        message: String,
    },

    /// The renderer returned an error; the synthesized 500 page is the body
    #[error("render failed for route '{route}': {message}")]
    RenderFailed {
        /// Route whose renderer failed
        route: String,
        /// Original renderer error message
        message: String,
    },

    /// The pool queue is at its cap; the caller should render inline instead
    #[error("worker queue at capacity ({cap} tasks)")]
    QueueFull {
        /// Queue cap that was hit (`max_workers * 4`)
        cap: usize,
    },

    /// A worker exited before replying; the in-flight task is invalidated
    #[error("worker died before replying")]
    WorkerDied,

    /// The optional per-task timeout fired; the worker was retired
    #[error("render task timed out after {timeout_ms} ms")]
    WorkerTimedOut {
        /// Configured timeout that fired
        timeout_ms: u64,
    },

    /// Submission after `shutdown()`
    #[error("worker pool is closed")]
    PoolClosed,

    /// The request could not be assembled into a render task
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The request body was consumed before task assembly
    #[error("request body already consumed")]
    BodyConsumed,

    /// `initialize()` called on an already-initialized pool
    #[error("worker pool already initialized")]
    AlreadyInitialized,

    /// A worker failed to spawn during pool startup
    #[error("worker failed to start: {0}")]
    WorkerInitFailed(String),
}

impl DispatchError {
    /// HTTP status code this error surfaces as.
    ///
    /// `QueueFull` maps to 503 for completeness but the dispatcher recovers
    /// from it locally and never surfaces it.
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::NotFound { .. } => 404,
            DispatchError::MalformedRequest(_) | DispatchError::BodyConsumed => 400,
            DispatchError::QueueFull { .. } | DispatchError::PoolClosed => 503,
            DispatchError::DataFetchFailed { .. }
            | DispatchError::RenderFailed { .. }
            | DispatchError::WorkerDied
            | DispatchError::WorkerTimedOut { .. }
            | DispatchError::AlreadyInitialized
            | DispatchError::WorkerInitFailed(_) => 500,
        }
    }

    /// Create a `DataFetchFailed` from any error-like message
    pub fn data_fetch(route: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataFetchFailed {
            route: route.into(),
            message: message.into(),
        }
    }

    /// Create a `RenderFailed` from any error-like message
    pub fn render(route: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RenderFailed {
            route: route.into(),
            message: message.into(),
        }
    }
}
