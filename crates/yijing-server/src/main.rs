#![doc = include_str!("../README.md")]

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use yijing::{Resolver, Tables};
use yijing_server::{
    config::{CliArgs, ServerConfig},
    http::{AppState, HealthReporter, router},
    interpret::{Interpreter, dashscope::DashScopeClient},
    pool::PoolConfig,
    service::DivinationService,
    sink::{JsonFileSink, MemorySink, RecordSink},
    telemetry::{TelemetryProviders, init_telemetry},
};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let tables = match &config.tables_dir {
        Some(dir) => Tables::load_dir(dir)
            .with_context(|| format!("failed to load tables from {}", dir.display()))?,
        None => Tables::builtin(),
    };
    tracing::info!(
        trigrams = tables.trigram_count(),
        hexagrams = tables.hexagram_count(),
        "Lookup tables ready"
    );

    let client = DashScopeClient::new(config.dashscope.clone())?;
    if !client.is_configured() {
        tracing::warn!("DASHSCOPE_API_KEY is not set; every interpretation will use fallback text");
    }
    let interpreter = Interpreter::new(
        Arc::new(client),
        config.interpret_timeout,
        config.advice_marker.as_str(),
    );

    let sink: Arc<dyn RecordSink> = match &config.data_dir {
        Some(dir) => Arc::new(JsonFileSink::in_dir(dir)),
        None => Arc::new(MemorySink::new()),
    };

    let service = DivinationService::new(
        Resolver::new(tables),
        interpreter,
        sink,
        &PoolConfig {
            num_workers: config.num_workers,
            queue_depth: config.queue_depth,
            shutdown_timeout: config.shutdown_timeout,
        },
    );
    let health = HealthReporter::new();
    let app = router(AppState {
        service: service.clone(),
        health: health.clone(),
    });

    let listener = TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr))?;
    log_startup_info(&config);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service, health, providers))
        .await?;

    Ok(())
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting divination service on {} with full config: {:#?}",
            config.server_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting divination service on {} with {} workers",
            config.server_addr,
            config.num_workers
        );
    }
}

async fn shutdown_signal(
    service: DivinationService,
    health: HealthReporter,
    providers: TelemetryProviders,
) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health.set_not_serving();

    // 2. Drain the worker pool
    if let Err(e) = service.shutdown().await {
        tracing::error!("Error during service shutdown: {e}");
    }
    let stats = service.stats();
    tracing::info!(jobs = stats.jobs, pending = stats.pending, "Service shut down");

    // 3. Flush exporters
    providers.shutdown();
}
