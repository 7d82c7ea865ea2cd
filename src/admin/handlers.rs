use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::admin::{AdminError, AdminState};
use crate::observability::metrics;
use crate::routing::ReconcileReport;
use crate::store::{
    AccessLogEntry, LogQuery, PolicyPatch, Service, ServicePatch, User, UserQuery,
    UserServicePolicy,
};

const DEFAULT_USER_LIMIT: usize = 50;
const MAX_USER_LIMIT: usize = 200;
const DEFAULT_LOG_LIMIT: usize = 100;
const MAX_LOG_LIMIT: usize = 500;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn list_services(State(state): State<AdminState>) -> Result<Json<Vec<Service>>, AdminError> {
    state.registry.invalidate().await?;
    Ok(Json(state.store.list_services().await?))
}

pub async fn reconcile_services(
    State(state): State<AdminState>,
) -> Result<Json<ReconcileReport>, AdminError> {
    let report = state.registry.invalidate().await?;
    metrics::record_audit_event("services_reconcile");
    tracing::info!(upserted = report.upserted, removed = report.removed, "Admin reconciled services");
    Ok(Json(report))
}

pub async fn update_service(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(patch): Json<ServicePatch>,
) -> Result<Json<Service>, AdminError> {
    ensure_positive("defaultRateLimitWindowSec", patch.default_rate_limit_window_sec)?;
    ensure_positive("defaultRateLimitMax", patch.default_rate_limit_max)?;
    if matches!(&patch.name, Some(name) if name.trim().is_empty()) {
        return Err(AdminError::BadRequest("name must not be empty".into()));
    }

    let service = state
        .store
        .update_service(&id, &patch)
        .await?
        .ok_or(AdminError::NotFound("service"))?;
    state.registry.refresh_snapshot().await?;

    metrics::record_audit_event("service_update");
    tracing::info!(service_id = %service.id, host = %service.host, "Admin updated service");
    Ok(Json(service))
}

#[derive(Debug, Default, Deserialize)]
pub struct UsersParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Serialize)]
pub struct UsersPage {
    pub users: Vec<User>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

pub async fn list_users(
    State(state): State<AdminState>,
    Query(params): Query<UsersParams>,
) -> Result<Json<UsersPage>, AdminError> {
    let limit = params.limit.unwrap_or(DEFAULT_USER_LIMIT).clamp(1, MAX_USER_LIMIT);
    let offset = params.offset.unwrap_or(0);
    let query = UserQuery {
        q: params.q.filter(|q| !q.trim().is_empty()),
        limit,
        offset,
    };

    let page = state.store.list_users(&query).await?;
    Ok(Json(UsersPage {
        users: page.items,
        total: page.total,
        limit,
        offset,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub role: Option<String>,
}

pub async fn set_user_role(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(update): Json<RoleUpdate>,
) -> Result<Json<User>, AdminError> {
    let role = update.role.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    let user = state
        .store
        .set_user_role(&id, role)
        .await?
        .ok_or(AdminError::NotFound("user"))?;

    metrics::record_audit_event("user_role_update");
    tracing::info!(user_id = %user.id, role = ?user.role, "Admin updated user role");
    Ok(Json(user))
}

#[derive(Serialize)]
pub struct ServicePolicyView {
    pub service: Service,
    pub policy: Option<UserServicePolicy>,
}

pub async fn user_policies(
    State(state): State<AdminState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ServicePolicyView>>, AdminError> {
    if state.store.find_user(&user_id).await?.is_none() {
        return Err(AdminError::NotFound("user"));
    }

    state.registry.invalidate().await?;
    let services = state.store.list_services().await?;
    let mut policies: HashMap<String, UserServicePolicy> = state
        .store
        .list_policies_for_user(&user_id)
        .await?
        .into_iter()
        .map(|p| (p.service_id.clone(), p))
        .collect();

    let views = services
        .into_iter()
        .map(|service| ServicePolicyView {
            policy: policies.remove(&service.id),
            service,
        })
        .collect();
    Ok(Json(views))
}

pub async fn put_policy(
    State(state): State<AdminState>,
    Path((user_id, service_id)): Path<(String, String)>,
    Json(patch): Json<PolicyPatch>,
) -> Result<Json<UserServicePolicy>, AdminError> {
    ensure_positive("rateLimitWindowSec", patch.rate_limit_window_sec)?;
    ensure_positive("rateLimitMax", patch.rate_limit_max)?;

    if state.store.find_user(&user_id).await?.is_none() {
        return Err(AdminError::NotFound("user"));
    }
    if state.store.find_service(&service_id).await?.is_none() {
        return Err(AdminError::NotFound("service"));
    }

    let policy = state.store.upsert_policy(&user_id, &service_id, &patch).await?;

    metrics::record_audit_event("policy_upsert");
    tracing::info!(
        user_id = %user_id,
        service_id = %service_id,
        allow = ?policy.allow,
        window_sec = ?policy.rate_limit_window_sec,
        max = ?policy.rate_limit_max,
        "Admin upserted policy"
    );
    Ok(Json(policy))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsParams {
    pub user_id: Option<String>,
    pub service_id: Option<String>,
    pub host: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Serialize)]
pub struct LogsPage {
    pub logs: Vec<AccessLogEntry>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

pub async fn list_logs(
    State(state): State<AdminState>,
    Query(params): Query<LogsParams>,
) -> Result<Json<LogsPage>, AdminError> {
    let limit = params.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    let offset = params.offset.unwrap_or(0);
    let query = LogQuery {
        user_id: non_empty(params.user_id),
        service_id: non_empty(params.service_id),
        host: non_empty(params.host).map(|h| h.to_ascii_lowercase()),
        from: parse_time("from", params.from)?,
        to: parse_time("to", params.to)?,
        limit,
        offset,
    };

    let page = state.store.query_access_logs(&query).await?;
    Ok(Json(LogsPage {
        logs: page.items,
        total: page.total,
        limit,
        offset,
    }))
}

/// `Some(Some(0))` is the only rejected shape: absent and null are fine.
fn ensure_positive(field: &str, value: Option<Option<u32>>) -> Result<(), AdminError> {
    match value {
        Some(Some(0)) => Err(AdminError::BadRequest(format!("{field} must be a positive integer"))),
        _ => Ok(()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_time(field: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>, AdminError> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| AdminError::BadRequest(format!("{field} must be an RFC 3339 timestamp"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive("x", None).is_ok());
        assert!(ensure_positive("x", Some(None)).is_ok());
        assert!(ensure_positive("x", Some(Some(3))).is_ok());
        assert!(matches!(ensure_positive("x", Some(Some(0))), Err(AdminError::BadRequest(_))));
    }

    #[test]
    fn test_parse_time() {
        let t = parse_time("from", Some("2026-01-02T03:04:05Z".into())).unwrap().unwrap();
        assert_eq!(t.to_rfc3339(), "2026-01-02T03:04:05+00:00");
        assert!(parse_time("from", Some("   ".into())).unwrap().is_none());
        assert!(parse_time("from", Some("yesterday".into())).is_err());
    }
}
