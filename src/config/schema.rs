//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Public listener (the proxied hosts).
    pub listener: ListenerConfig,

    /// Upstream timeouts.
    pub timeouts: TimeoutConfig,

    /// Declarative host → upstream source and refresh policy.
    pub services: ServicesConfig,

    /// Session resolution and login redirect.
    pub auth: AuthConfig,

    /// The gateway's own frontend (login page, auth endpoints).
    pub frontend: FrontendConfig,

    /// Per-user rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Access log queue and retention.
    pub audit: AuditConfig,

    /// Reference store settings.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the upstream to return response headers, in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 60,
        }
    }
}

/// Where the host → upstream mapping comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// JSON in an environment variable.
    #[default]
    Env,
    /// JSON in a file.
    File,
    /// `[services.hosts]` in this config.
    Inline,
}

/// One inline host mapping.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostEntry {
    pub upstream: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub source: SourceKind,

    /// Environment variable read when `source = "env"`.
    pub env_var: String,

    /// JSON file read when `source = "file"`.
    pub path: Option<PathBuf>,

    /// Mappings used when `source = "inline"`.
    pub hosts: BTreeMap<String, HostEntry>,

    /// Background reconciliation interval. 0 reconciles on every lookup.
    pub refresh_interval_secs: u64,

    /// Watch the services file and reconcile on change.
    pub watch: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Env,
            env_var: "GATEWAY_SERVICES".to_string(),
            path: None,
            hosts: BTreeMap::new(),
            refresh_interval_secs: 30,
            watch: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Endpoint returning the current session for the forwarded cookies.
    pub session_url: String,

    /// Where unauthenticated users are sent. Relative URLs stay on the
    /// requested host.
    pub login_url: String,

    /// Session lookup timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_url: "http://127.0.0.1:3000/_gateback/auth/get-session".to_string(),
            login_url: "/_gatefront/auth/sign-in".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FrontendConfig {
    /// Upstream serving `/_gatefront` and `/_gateback`. When unset those
    /// paths are not forwarded.
    pub upstream: Option<String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enforce per-user/per-service limits.
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Pending entries before new ones are dropped.
    pub queue_capacity: usize,

    /// Access log entries kept by the in-memory store.
    pub retention: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            retention: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot of services, users and policies, loaded at startup and
    /// written at shutdown.
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

/// Placeholder key; validation refuses to start the admin API with it.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
