//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start background tasks (services watcher, metrics, admin API)
//! - Bind listeners and begin accepting traffic
//! - On shutdown, stop listeners, drain audit entries, save the store
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::watcher::SourceWatcher;
use crate::config::{GatewayConfig, SourceKind};
use crate::http::gate::RESERVED_PREFIXES;
use crate::http::{GatewayDeps, GatewayServer};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::routing::ServiceRegistry;
use crate::session::{HttpSessionResolver, SessionError};
use crate::store::{MemoryStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("session resolver: {0}")]
    Session(#[from] SessionError),

    #[error("services watcher: {0}")]
    Watch(#[from] notify::Error),

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("gateway task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Run the gateway until a shutdown signal arrives.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    let store = Arc::new(match &config.store.snapshot_path {
        Some(path) => MemoryStore::load_from_file(path, config.audit.retention)?,
        None => MemoryStore::new(config.audit.retention, None),
    });
    let sessions = Arc::new(HttpSessionResolver::new(
        &config.auth.session_url,
        Duration::from_secs(config.auth.timeout_secs),
    )?);

    if config.frontend.upstream.is_none()
        && RESERVED_PREFIXES
            .iter()
            .any(|prefix| config.auth.login_url.starts_with(prefix))
    {
        tracing::warn!(
            login_url = %config.auth.login_url,
            "Login URL is a gateway path but no frontend upstream is set; sign-in will answer 404"
        );
    }

    if config.observability.metrics_enabled {
        metrics::init_metrics(parse_addr(&config.observability.metrics_address)?);
    }

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(
        &config,
        GatewayDeps {
            store: store.clone(),
            sessions,
        },
    );
    let registry = server.registry();

    // The watcher handle must stay alive for events to flow.
    let _watcher = match watched_services_file(&config) {
        Some(path) => Some(spawn_source_watcher(&path, registry.clone(), shutdown.subscribe())?),
        None => None,
    };

    let admin_task = if config.admin.enabled {
        Some(
            spawn_admin(
                &config,
                AdminState {
                    store: store.clone(),
                    registry: registry.clone(),
                    api_key: Arc::from(config.admin.api_key.as_str()),
                },
                shutdown.subscribe(),
            )
            .await?,
        )
    } else {
        None
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));
    let finished_early = tokio::select! {
        _ = signals::shutdown_signal() => None,
        result = &mut server_task => Some(result),
    };

    tracing::info!(subscribers = shutdown.receiver_count(), "Shutting down");
    shutdown.trigger();

    let server_result = match finished_early {
        Some(result) => result,
        None => server_task.await,
    };
    if let Some(admin_task) = admin_task {
        if let Err(e) = admin_task.await {
            tracing::error!(error = %e, "Admin API task failed");
        }
    }

    if let Err(e) = store.save_to_file() {
        tracing::error!(error = %e, "Failed to save store snapshot");
    }

    server_result??;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn parse_addr(raw: &str) -> Result<SocketAddr, StartupError> {
    raw.parse()
        .map_err(|_| StartupError::InvalidAddress(raw.to_string()))
}

fn watched_services_file(config: &GatewayConfig) -> Option<PathBuf> {
    match (config.services.source, config.services.watch) {
        (SourceKind::File, true) => config.services.path.clone(),
        _ => None,
    }
}

/// Reconcile whenever the services file changes.
fn spawn_source_watcher(
    path: &std::path::Path,
    registry: Arc<ServiceRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<notify::RecommendedWatcher, StartupError> {
    let (watcher, mut changes) = SourceWatcher::new(path);
    let handle = watcher.run()?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = changes.recv() => {
                    // Editors emit bursts of events for one save.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    while changes.try_recv().is_ok() {}

                    match registry.invalidate().await {
                        Ok(report) => tracing::info!(
                            upserted = report.upserted,
                            removed = report.removed,
                            "Services reloaded from file"
                        ),
                        Err(e) => tracing::error!(error = %e, "Services reload failed"),
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    });

    Ok(handle)
}

async fn spawn_admin(
    config: &GatewayConfig,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<JoinHandle<()>, StartupError> {
    let listener = TcpListener::bind(&config.admin.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    let app = setup_admin_router(state);
    Ok(tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Admin API server error");
        }
    }))
}
