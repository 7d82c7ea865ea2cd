//! Persisted entities shared by the gate, the registry and the admin API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A routable host and the backend it forwards to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    /// Routing key, stored lower-case. Unique across services.
    pub host: String,
    /// Base URL of the backend (`http://host:port`).
    pub upstream: String,
    pub name: String,
    pub default_allow: bool,
    pub default_rate_limit_window_sec: Option<u32>,
    pub default_rate_limit_max: Option<u32>,
}

impl Service {
    /// A freshly discovered service: named after its host, open to everyone,
    /// no rate limit.
    pub fn discovered(host: &str, upstream: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            host: host.to_string(),
            upstream: upstream.to_string(),
            name: host.to_string(),
            default_allow: true,
            default_rate_limit_window_sec: None,
            default_rate_limit_max: None,
        }
    }
}

/// Per-user override of a service's defaults. `None` fields inherit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserServicePolicy {
    pub user_id: String,
    pub service_id: String,
    pub allow: Option<bool>,
    pub rate_limit_window_sec: Option<u32>,
    pub rate_limit_max: Option<u32>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    /// Comma-separated role list, e.g. `"admin,user"`.
    pub role: Option<String>,
    #[serde(default)]
    pub banned: bool,
    pub created_at: DateTime<Utc>,
}

/// Why a request was stopped before (or while) reaching its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockedReason {
    MissingHost,
    NoService,
    NoSession,
    Deny,
    RateLimit,
    UpstreamError,
}

impl BlockedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockedReason::MissingHost => "MISSING_HOST",
            BlockedReason::NoService => "NO_SERVICE",
            BlockedReason::NoSession => "NO_SESSION",
            BlockedReason::Deny => "DENY",
            BlockedReason::RateLimit => "RATE_LIMIT",
            BlockedReason::UpstreamError => "UPSTREAM_ERROR",
        }
    }
}

impl std::fmt::Display for BlockedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record per gated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub host: String,
    pub path: String,
    pub method: String,
    pub status: u16,
    pub upstream: Option<String>,
    pub blocked_reason: Option<BlockedReason>,
    pub user_id: Option<String>,
    pub service_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Admin edit of a service's display name and defaults.
///
/// Absent fields are left alone; an explicit `null` clears a rate-limit default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePatch {
    pub name: Option<String>,
    pub default_allow: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub default_rate_limit_window_sec: Option<Option<u32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub default_rate_limit_max: Option<Option<u32>>,
}

/// Admin upsert of a per-user override. Same absent/null rules as [`ServicePatch`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPatch {
    #[serde(default, deserialize_with = "nullable")]
    pub allow: Option<Option<bool>>,
    #[serde(default, deserialize_with = "nullable")]
    pub rate_limit_window_sec: Option<Option<u32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub rate_limit_max: Option<Option<u32>>,
}

/// Distinguishes `"field": null` (Some(None)) from a missing field (None).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub q: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub user_id: Option<String>,
    pub service_id: Option<String>,
    pub host: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl LogQuery {
    pub fn matches(&self, entry: &AccessLogEntry) -> bool {
        if let Some(user_id) = &self.user_id {
            if entry.user_id.as_ref() != Some(user_id) {
                return false;
            }
        }
        if let Some(service_id) = &self.service_id {
            if entry.service_id.as_ref() != Some(service_id) {
                return false;
            }
        }
        if let Some(host) = &self.host {
            if &entry.host != host {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.created_at > to {
                return false;
            }
        }
        true
    }
}

/// One page of a filtered listing plus the unpaged total.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}
