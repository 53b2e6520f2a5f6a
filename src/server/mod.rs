//! # Server Module
//!
//! HTTP boundary for the render dispatcher, built on `may_minihttp` and the
//! `may` coroutine runtime.
//!
//! Request flow:
//!
//! ```text
//! HTTP connection → AppService → (introspection endpoints | RenderDispatcher)
//! ```
//!
//! The boundary owns protocol concerns only: it parses the request into the
//! dispatcher's shape, serves `/health`, `/api/metrics` and
//! `/api/server-info` directly (these must read live pool state, so they
//! run on the request coroutine in every mode), and writes whatever reply
//! the dispatcher assembles.

/// may_minihttp server wrapper
pub mod http_server;
/// Request parsing into the dispatcher's shape
pub mod request;
/// Reply and JSON writers
pub mod response;
/// Boundary service
pub mod service;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_request, split_query};
pub use response::{write_json_no_cache, write_reply};
pub use service::AppService;
