//! The gate: per-request authorization pipeline.
//!
//! # Data Flow
//! ```text
//! request
//!     → host (400 MISSING_HOST)
//!     → ServiceRegistry::resolve (502 NO_SERVICE)
//!     → SessionResolver::get_session (302 NO_SESSION)
//!     → store policy + policy::resolve (403 DENY)
//!     → RateLimiter::check (429 RATE_LIMIT)
//!     → RequestForwarder::forward (upstream status, or 502/504 UPSTREAM_ERROR)
//! ```
//!
//! # Design Decisions
//! - The pipeline returns `Result<Response, GatewayError>`; the handler is
//!   the single exit point, so each request yields exactly one access log
//!   entry and one metrics observation
//! - The access record is filled in as the pipeline learns the host,
//!   service and user, so rejections carry whatever was known
//! - Audit writes are queued, never awaited
//! - No lock is held across an await

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::error::GatewayError;
use crate::http::forward::{ForwardAs, RequestForwarder};
use crate::http::request::request_id;
use crate::http::response::login_redirect;
use crate::observability::{metrics, AuditSink};
use crate::routing::host::request_host;
use crate::routing::ServiceRegistry;
use crate::security::headers::client_ip;
use crate::security::rate_limit::now_ms;
use crate::security::{policy, RateLimitKey, RateLimiter};
use crate::session::{SessionResolver, SessionUser};
use crate::store::{AccessLogEntry, BlockedReason, Store, User};

const GATEBACK: &str = "/_gateback";
const GATEFRONT: &str = "/_gatefront";

/// Path prefixes owned by the gateway's own frontend.
pub const RESERVED_PREFIXES: [&str; 2] = [GATEBACK, GATEFRONT];

/// Settings the gate reads per request.
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub login_url: String,
    pub frontend_upstream: Option<String>,
    pub rate_limit_enabled: bool,
}

/// Everything the gate handler needs. Cheap to clone.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<ServiceRegistry>,
    pub store: Arc<dyn Store>,
    pub sessions: Arc<dyn SessionResolver>,
    pub limiter: Arc<RateLimiter>,
    pub forwarder: RequestForwarder,
    pub audit: AuditSink,
    pub settings: Arc<GateSettings>,
}

/// Access record under construction.
struct AccessRecord {
    entry: AccessLogEntry,
}

impl AccessRecord {
    fn begin(request: &Request<Body>, peer: Option<SocketAddr>) -> Self {
        let headers = request.headers();
        Self {
            entry: AccessLogEntry {
                id: uuid::Uuid::new_v4().to_string(),
                created_at: Utc::now(),
                host: String::new(),
                path: request.uri().path().to_string(),
                method: request.method().to_string(),
                status: 0,
                upstream: None,
                blocked_reason: None,
                user_id: None,
                service_id: None,
                ip: client_ip(headers, peer),
                user_agent: headers
                    .get(header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
            },
        }
    }

    fn finish(mut self, status: StatusCode, blocked_reason: Option<BlockedReason>) -> AccessLogEntry {
        self.entry.status = status.as_u16();
        self.entry.blocked_reason = blocked_reason;
        self.entry
    }
}

/// Entry point for every proxied request.
pub async fn gate_handler(State(state): State<GatewayState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = if reserved_prefix(&path).is_some() {
        serve_reserved(&state, request).await
    } else {
        gate(&state, request).await
    };

    metrics::record_request(&method, &path, response.status().as_u16(), start);
    response
}

/// Run the pipeline and emit the access record for its outcome.
async fn gate(state: &GatewayState, request: Request<Body>) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let request_id = request_id(request.headers()).to_string();
    let mut record = AccessRecord::begin(&request, peer);

    let (response, blocked_reason) = match run_pipeline(state, request, &mut record).await {
        Ok(response) => (response, None),
        Err(error) => {
            log_rejection(&request_id, &record, &error);
            if let GatewayError::Upstream(e) = &error {
                metrics::record_upstream_error(e.kind());
            }
            let reason = error.blocked_reason();
            (error.into_response(), reason)
        }
    };

    state.audit.record(record.finish(response.status(), blocked_reason));
    response
}

/// The pipeline proper. Every early return is a `GatewayError`.
async fn run_pipeline(
    state: &GatewayState,
    request: Request<Body>,
    record: &mut AccessRecord,
) -> Result<Response, GatewayError> {
    let host = request_host(request.headers(), request.uri()).ok_or(GatewayError::MissingHost)?;
    record.entry.host = host.clone();

    let service = state
        .registry
        .resolve(&host)
        .await?
        .ok_or_else(|| GatewayError::NoUpstream {
            host: host.clone(),
            hint: state.registry.source().describe(),
        })?;
    record.entry.service_id = Some(service.id.clone());
    record.entry.upstream = Some(service.upstream.clone());

    let session = match state.sessions.get_session(request.headers()).await {
        Ok(Some(session)) => {
            metrics::record_auth_event("success", "session_ok");
            session
        }
        Ok(None) => {
            metrics::record_auth_event("failure", "no_session");
            return Err(no_session(state, &request));
        }
        Err(e) => {
            tracing::warn!(host = %host, error = %e, "Session lookup failed, treating as signed out");
            metrics::record_auth_event("failure", "session_error");
            return Err(no_session(state, &request));
        }
    };
    let user_id = session.user.id.clone();
    record.entry.user_id = Some(user_id.clone());
    remember_user(state, &session.user).await;

    let stored_policy = state.store.find_policy(&user_id, &service.id).await?;
    let effective = policy::resolve(&service, stored_policy.as_ref());
    if !effective.allow {
        return Err(GatewayError::PolicyDenied);
    }

    if state.settings.rate_limit_enabled {
        if let Some((window_sec, max)) = effective.rate_limit() {
            let now = now_ms();
            let key = RateLimitKey::new(user_id.as_str(), service.id.as_str());
            let decision = state.limiter.check_at(&key, window_sec, max, now);
            if !decision.allowed {
                metrics::record_rate_limited(record.entry.ip.as_deref());
                return Err(GatewayError::RateLimited {
                    limit: decision.limit,
                    retry_after: decision.retry_after_secs(now),
                });
            }
        }
    }

    let response = state
        .forwarder
        .forward(
            request,
            &service.upstream,
            ForwardAs {
                host: &host,
                user_id: &user_id,
                service_id: &service.id,
            },
        )
        .await?;
    Ok(response)
}

fn no_session(state: &GatewayState, request: &Request<Body>) -> GatewayError {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    GatewayError::NoSession {
        location: login_redirect(&state.settings.login_url, path_and_query),
    }
}

/// Record the user on first sight. Failures never block the request.
async fn remember_user(state: &GatewayState, user: &SessionUser) {
    let record = User {
        id: user.id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role.clone(),
        banned: false,
        created_at: Utc::now(),
    };
    match state.store.insert_user_if_absent(record).await {
        Ok(true) => tracing::info!(user_id = %user.id, "Recorded new user"),
        Ok(false) => {}
        Err(e) => tracing::warn!(user_id = %user.id, error = %e, "Failed to record user"),
    }
}

fn log_rejection(request_id: &str, record: &AccessRecord, error: &GatewayError) {
    let entry = &record.entry;
    match error {
        GatewayError::Upstream(_) | GatewayError::Store(_) => tracing::error!(
            request_id = %request_id,
            host = %entry.host,
            service_id = ?entry.service_id,
            user_id = ?entry.user_id,
            error = %error,
            "Request failed"
        ),
        GatewayError::MissingHost | GatewayError::NoUpstream { .. } => tracing::warn!(
            request_id = %request_id,
            host = %entry.host,
            error = %error,
            "Request rejected"
        ),
        _ => tracing::debug!(
            request_id = %request_id,
            host = %entry.host,
            service_id = ?entry.service_id,
            user_id = ?entry.user_id,
            error = %error,
            "Request rejected"
        ),
    }
}

fn reserved_prefix(path: &str) -> Option<&'static str> {
    RESERVED_PREFIXES.into_iter().find(|prefix| {
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Ungated handling of the gateway's own paths. Without a frontend
/// upstream they do not exist, so the login redirect target can never
/// redirect again.
async fn serve_reserved(state: &GatewayState, request: Request<Body>) -> Response {
    let Some(upstream) = &state.settings.frontend_upstream else {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    match state.forwarder.forward_raw(request, upstream).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(upstream = %upstream, error = %e, "Frontend upstream request failed");
            metrics::record_upstream_error(e.kind());
            GatewayError::Upstream(e).into_response()
        }
    }
}
