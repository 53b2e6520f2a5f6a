use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ssr_dispatch::config::DispatchConfig;
use ssr_dispatch::cpu;
use ssr_dispatch::dispatcher::RenderDispatcher;
use ssr_dispatch::middleware::{MetricsMiddleware, TracingMiddleware};
use ssr_dispatch::pool::{PoolConfig, WorkerPool};
use ssr_dispatch::registry::load_registry;
use ssr_dispatch::server::{AppService, HttpServer};

/// Hard ceiling on graceful shutdown before the process force-exits
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> io::Result<()> {
    let config = DispatchConfig::from_env();
    init_tracing(config.debug);

    let detected_cpus = cpu::detect_cpus();
    info!(
        mode = %config.mode,
        detected_cpus,
        worker_threads = ?config.worker_threads,
        "Starting ssr-dispatch"
    );

    let registry = Arc::new(load_registry());
    let mut dispatcher = RenderDispatcher::new(registry, config.mode);

    let pool = if config.mode.uses_pool() {
        let pool_config = PoolConfig::from_detected(detected_cpus, config.worker_threads);
        let pool = Arc::new(WorkerPool::new(pool_config, load_registry));
        pool.initialize().map_err(io::Error::other)?;
        dispatcher = dispatcher.with_pool(pool.clone());
        Some(pool)
    } else {
        None
    };

    dispatcher.add_middleware(Arc::new(TracingMiddleware));
    dispatcher.add_middleware(Arc::new(MetricsMiddleware::new()));

    let service = AppService::new(Arc::new(dispatcher));
    let addr = config.bind_addr();
    let server = HttpServer(service).start(&addr).map_err(io::Error::other)?;
    info!(addr = %addr, "Server listening");

    // Park until a termination signal, then drain: stop accepting first,
    // then let the pool finish in-flight renders.
    let (signal_tx, signal_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = signal_tx.send(());
    })
    .map_err(|e| io::Error::other(format!("failed to install signal handler: {e}")))?;

    let _ = signal_rx.recv();
    info!("Termination signal received, shutting down");

    // Force-exit guard: if draining stalls, the watchdog wins.
    thread::spawn(|| {
        thread::sleep(SHUTDOWN_DEADLINE);
        error!(
            deadline_s = SHUTDOWN_DEADLINE.as_secs(),
            "Shutdown deadline exceeded, forcing exit"
        );
        std::process::exit(1);
    });

    server.stop();
    if let Some(pool) = pool {
        pool.shutdown();
    }
    info!("Shutdown complete");
    Ok(())
}
