pub mod config;
pub mod cpu;
pub mod dispatcher;
pub mod error;
pub mod fetch;
pub mod ids;
pub mod middleware;
pub mod mock_api;
pub mod pool;
pub mod registry;
pub mod render;
pub mod server;
pub mod task;

pub use config::{DispatchConfig, SsrMode};
pub use dispatcher::{RenderDispatcher, Reply};
pub use error::DispatchError;
pub use pool::{PoolConfig, WorkerPool};
pub use registry::{load_registry, RouteDefinition, RouteRegistry, WorkloadKind};
pub use task::{RenderOutput, RenderTask};
