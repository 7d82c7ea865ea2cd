//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the gate as the only handler
//! - Wire up middleware (request ID, tracing)
//! - Start the registry refresh task
//! - Bind server to listener and drain the audit queue on shutdown

use axum::{body::Body, http::Request, routing::any, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::http::forward::RequestForwarder;
use crate::http::gate::{gate_handler, GateSettings, GatewayState};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::observability::AuditSink;
use crate::routing::{ServiceRegistry, ServiceSource};
use crate::security::RateLimiter;
use crate::session::SessionResolver;
use crate::store::Store;

/// Upper bound on waiting for queued access log entries at shutdown.
const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pluggable collaborators of the gateway.
#[derive(Clone)]
pub struct GatewayDeps {
    pub store: Arc<dyn Store>,
    pub sessions: Arc<dyn SessionResolver>,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    state: GatewayState,
    audit_worker: JoinHandle<()>,
}

impl GatewayServer {
    /// Create the server and start its audit worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &GatewayConfig, deps: GatewayDeps) -> Self {
        let registry = Arc::new(ServiceRegistry::new(
            deps.store.clone(),
            ServiceSource::from_config(&config.services),
            config.services.refresh_interval_secs,
        ));
        let forwarder = RequestForwarder::new(
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.upstream_secs),
        );
        let (audit, audit_worker) = AuditSink::spawn(deps.store.clone(), config.audit.queue_capacity);

        let state = GatewayState {
            registry,
            store: deps.store,
            sessions: deps.sessions,
            limiter: Arc::new(RateLimiter::new()),
            forwarder,
            audit,
            settings: Arc::new(GateSettings {
                login_url: config.auth.login_url.clone(),
                frontend_upstream: config.frontend.upstream.clone(),
                rate_limit_enabled: config.rate_limit.enabled,
            }),
        };

        Self { state, audit_worker }
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.state.registry.clone()
    }

    /// The gateway router with all middleware layers.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` fires, then drain the audit queue.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway server starting");

        let registry = self.state.registry.clone();
        if let Err(e) = registry.invalidate().await {
            tracing::error!(error = %e, "Initial service reconciliation failed");
        }
        tokio::spawn(registry.run_refresh(shutdown.resubscribe()));

        let app = build_router(self.state.clone()).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Gateway server received shutdown signal");
            })
            .await?;

        // The sink closes once the last state clone is gone.
        let Self { state, audit_worker } = self;
        drop(state);
        match tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, audit_worker).await {
            Ok(_) => tracing::debug!("Audit queue drained"),
            Err(_) => tracing::warn!("Timed out draining audit queue"),
        }

        tracing::info!("Gateway server stopped");
        Ok(())
    }
}

fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", any(gate_handler))
        .route("/{*path}", any(gate_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        request_id = %request_id(request.headers()),
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                }))
                .layer(propagate_request_id_layer()),
        )
}
