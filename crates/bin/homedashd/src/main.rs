//! # homedashd — homedash daemon
//!
//! Composition root that wires the reactive core, its adapters and
//! integrations together and starts the server.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars) and initialise logging
//! - Open the `SQLite` snapshot store and run migrations
//! - Bootstrap the core services and restore persisted state
//! - Set up integrations and wait for backend connections
//! - Start the poller, announce readiness and serve HTTP
//! - Shut down gracefully on Ctrl-C: stop timers, tear down integrations,
//!   flush pending state writes
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use homedash_adapter_http_axum::state::AppState;
use homedash_adapter_storage_sqlite_sqlx::{Config as StorageConfig, SqliteSnapshotStore};
use homedash_adapter_virtual::VirtualIntegration;
use homedash_app::context::AppContext;
use homedash_app::ports::Integration;
use homedash_domain::topic;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Storage
    let db = StorageConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let storage = SqliteSnapshotStore::new(db.pool().clone());

    // Core
    let context = AppContext::bootstrap(config.core(config.monitored_services()?))?;
    context.store().init(storage).await;

    // Integrations
    let mut virtual_integration = config
        .integrations
        .virtual_enabled
        .then(|| VirtualIntegration::new(config.virtual_config()));
    if let Some(integration) = virtual_integration.as_mut() {
        integration.setup(&context).await?;
        tracing::info!(integration = integration.name(), "integration ready");
    }

    // Connections
    let monitor = context.monitor();
    let statuses = monitor
        .wait_for_connections(config.monitor.wait_options())
        .await;
    monitor.schedule(&context.poller(), config.monitor.interval())?;

    context.poller().start_all();
    context.bus().emit(
        topic::APP_READY,
        json!({
            "services": statuses.len(),
            "online": monitor.online_count(),
        }),
    );

    // HTTP
    let app = homedash_adapter_http_axum::router::build(AppState::new(&context));
    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "homedashd listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Shutdown
    tracing::info!("shutting down");
    context.poller().stop_all();
    if let Some(integration) = virtual_integration.as_mut()
        && let Err(err) = integration.teardown(&context).await
    {
        tracing::error!(integration = integration.name(), error = %err, "integration teardown failed");
    }
    context.store().flush_persisted().await;
    db.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
