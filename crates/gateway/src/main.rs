//! Gateway service entry point.
//!
//! WebSocket gateway for real-time streaming of shared tabular resources.

use anyhow::Result;
use gateway::{create_router, AppState, ConnectionHub, HubConfig, WorkerCommand, WorkerRegistry};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Gateway service");

    // Read configuration from environment
    let http_port: u16 = env::var("HTTP_PORT")
        .unwrap_or_else(|_| "8000".to_string())
        .parse()
        .expect("HTTP_PORT must be a number");
    let metrics_port: u16 = env::var("METRICS_PORT")
        .unwrap_or_else(|_| "9093".to_string())
        .parse()
        .expect("METRICS_PORT must be a number");
    let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| ".".to_string()));
    let worker_program = env::var("WORKER_PROGRAM").unwrap_or_else(|_| "python".to_string());
    let worker_args = env::var("WORKER_ARGS").unwrap_or_else(|_| "main.py".to_string());
    let worker_offset_flag = env::var("WORKER_OFFSET_FLAG").ok();

    info!("Configuration:");
    info!("  HTTP_PORT: {}", http_port);
    info!("  METRICS_PORT: {}", metrics_port);
    info!("  DATA_DIR: {}", data_dir.display());
    info!("  WORKER_PROGRAM: {}", worker_program);
    info!("  WORKER_ARGS: {}", worker_args);

    // Start Prometheus metrics server
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], metrics_port))
        .install()
        .expect("Failed to start Prometheus exporter");
    info!("Prometheus metrics server started on port {}", metrics_port);

    // Build the worker launch command
    let mut command = WorkerCommand::new(worker_program).with_args(worker_args.split_whitespace());
    if let Some(flag) = worker_offset_flag {
        command = command.with_offset_flag(flag);
    }

    // Create the worker registry and connection hub
    let registry = Arc::new(WorkerRegistry::new(command));
    let hub = Arc::new(ConnectionHub::new(registry.clone(), HubConfig { data_dir }));

    // Create application state
    let state = Arc::new(AppState { hub: hub.clone() });

    // Create HTTP router
    let app = create_router(state);

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let listener = TcpListener::bind(addr).await?;
    info!("Gateway listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain sessions first so every registry reference is returned, then
    // stop whatever workers remain
    info!("Shutting down sessions and workers...");
    hub.shutdown().await;
    registry.shutdown().await;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
