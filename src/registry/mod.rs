//! # Route Registry Module
//!
//! Ordered collection of route definitions pairing a URL pattern with a
//! data fetcher (I/O) and a renderer (pure CPU). The registry is frozen at
//! process init and loaded identically in every worker; workers resolve
//! routes by stable name, never by transported function references.

mod builtin;
mod core;

pub use builtin::load_registry;
pub use core::{
    FetchContext, FetcherFn, RegistryBuilder, RegistryLoader, RenderContext, RendererFn,
    RouteDefinition, RouteMatch, RouteRegistry, WorkloadKind,
};
