//! Admin API: services, users, per-user policies and access logs.
//!
//! Runs on its own listener behind a bearer API key. Every mutation is
//! counted in `audit_events_total` and logged.

pub mod auth;
pub mod error;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::routing::ServiceRegistry;
use crate::store::Store;

use self::auth::admin_auth_middleware;
pub use self::error::AdminError;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<ServiceRegistry>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/services", get(list_services))
        .route("/admin/services/reconcile", post(reconcile_services))
        .route("/admin/services/{id}", patch(update_service))
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}/role", patch(set_user_role))
        .route("/admin/users/{id}/policies", get(user_policies))
        .route("/admin/users/{id}/policies/{service_id}", put(put_policy))
        .route("/admin/logs", get(list_logs))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
