//! Metrics Agent - container metrics sidecar
//!
//! Samples every running container on the local Docker engine, keeps a
//! bounded history per container and serves it over an authenticated
//! HTTP API next to health and Prometheus endpoints.

use agent_lib::{
    collector::CollectionLoop,
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    AccessLog, ContainerRuntime, DockerRuntime, HistoryStore, QueryEngine, RateCache,
};
use anyhow::{Context, Result};
use metrics_agent::{api, config::AgentConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting metrics-agent");

    let config = AgentConfig::load().context("failed to load configuration")?;
    info!(
        instance = %config.instance_name,
        port = config.port,
        interval_secs = config.interval_secs,
        "Agent configured"
    );
    let logger = StructuredLogger::new(&config.instance_name);

    let docker = match &config.docker_socket {
        Some(socket) => DockerRuntime::with_socket(socket)?,
        None => DockerRuntime::connect()?,
    };
    docker
        .ping()
        .await
        .context("cannot reach the Docker engine")?;
    logger.log_runtime_connected(config.docker_socket.as_deref().unwrap_or("local defaults"));

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(docker);
    let engine_config = config.engine();
    let history = Arc::new(HistoryStore::new(engine_config.retention_points));
    let rates = Arc::new(RateCache::new());

    let health_registry = HealthRegistry::new();
    health_registry.register(components::RUNTIME).await;
    health_registry.register(components::COLLECTOR).await;

    let query = QueryEngine::new(runtime.clone(), history.clone(), rates.clone(), &engine_config);
    let app_state = Arc::new(
        api::AppState::new(
            query,
            health_registry.clone(),
            AccessLog::new(&config.access_log_path),
            config.token.clone(),
        )
        .with_logger(logger.clone()),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let collection_loop = CollectionLoop::new(runtime, history, rates, engine_config)
        .with_health(health_registry.clone());
    let collector_handle = tokio::spawn(collection_loop.run(shutdown_tx.subscribe()));

    let api_handle = tokio::spawn(api::serve(config.port, app_state, shutdown_tx.subscribe()));

    health_registry.set_ready(true).await;
    logger.log_startup(AGENT_VERSION, config.port);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    if let Err(e) = collector_handle.await {
        error!(error = %e, "Collection loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
