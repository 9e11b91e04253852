#![deny(unused)]
//! replbox - sandboxed code execution backend
//!
//! Serves a single HTTP endpoint that provisions one container per session,
//! runs submitted snippets inside it and tears it down on request.

use std::sync::Arc;

use replbox_core::config::AppConfig;
use replbox_gateway::{GatewayConfig, GatewayServer};
use replbox_sandbox::{ContainerRuntime, ContainerSettings, DockerRuntime, SessionManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // Initialize tracing
    replbox_telemetry::configure_tracing(&config.telemetry)?;
    if let Some(e) = config_error {
        tracing::warn!("Failed to load configuration ({}). Using defaults.", e);
    }

    tracing::info!("Starting replbox v{}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // Container runtime
    // =========================================================================
    let runtime = DockerRuntime::new(ContainerSettings::from(&config.sandbox))?;
    if !runtime.is_available().await {
        tracing::error!("Docker daemon not reachable; sessions cannot be provisioned");
        anyhow::bail!("container runtime unavailable");
    }
    tracing::info!("🐳 Docker runtime available");

    // =========================================================================
    // Session manager
    // =========================================================================
    let languages = config.language_registry();
    tracing::info!(languages = ?languages.names(), "Language registry initialized");

    let manager = Arc::new(SessionManager::new(
        Arc::new(runtime),
        languages,
        config.sandbox.clone(),
    ));
    match manager.reclaim_orphans().await {
        Ok(0) => {}
        Ok(n) => tracing::info!(containers = n, "Removed containers left by a previous run"),
        Err(e) => tracing::warn!("Failed to reclaim orphaned containers: {}", e),
    }
    let reaper = manager.spawn_reaper();

    // =========================================================================
    // Start the server
    // =========================================================================
    let mut server = GatewayServer::new(GatewayConfig::from(&config.server), manager.clone());
    if config.telemetry.metrics {
        let handle = replbox_telemetry::setup_metrics_recorder()?;
        server = server.with_metrics(handle);
    }

    server.run(shutdown_signal()).await?;

    reaper.abort();
    manager.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
