//! Storage contract for services, users, per-user policies and access logs.
//!
//! # Data Flow
//! ```text
//! routing::ServiceRegistry ──upsert/retain──▶ Store ◀──CRUD── admin API
//! http::gate ──find policy / touch user──▶ Store
//! observability::audit worker ──insert access log──▶ Store
//! ```
//!
//! # Design Decisions
//! - The engine is pluggable; `MemoryStore` is the reference implementation
//! - Upserts are keyed by natural keys (host, user+service) so concurrent
//!   reconciliation stays idempotent
//! - Rate-limit counters never live here; they are process-local

pub mod memory;
pub mod models;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use models::{
    AccessLogEntry, BlockedReason, LogQuery, Page, PolicyPatch, Service, ServicePatch, User,
    UserQuery, UserServicePolicy,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read/write contract the gateway needs from persistent storage.
#[async_trait]
pub trait Store: Send + Sync {
    /// All services ordered by host.
    async fn list_services(&self) -> StoreResult<Vec<Service>>;

    async fn find_service(&self, id: &str) -> StoreResult<Option<Service>>;

    async fn find_service_by_host(&self, host: &str) -> StoreResult<Option<Service>>;

    /// Create the service for `host` with discovery defaults, or update only
    /// its upstream if it already exists.
    async fn upsert_service(&self, host: &str, upstream: &str) -> StoreResult<Service>;

    /// Delete every service whose host is not in `hosts`. Returns how many
    /// were removed.
    async fn retain_services(&self, hosts: &[String]) -> StoreResult<usize>;

    async fn update_service(&self, id: &str, patch: &ServicePatch) -> StoreResult<Option<Service>>;

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;

    /// Record a user unless one with the same id already exists.
    /// Returns true when the user was inserted.
    async fn insert_user_if_absent(&self, user: User) -> StoreResult<bool>;

    /// Users matching `q` (email or name, case-insensitive), newest first.
    async fn list_users(&self, query: &UserQuery) -> StoreResult<Page<User>>;

    async fn set_user_role(&self, id: &str, role: Option<String>) -> StoreResult<Option<User>>;

    async fn find_policy(
        &self,
        user_id: &str,
        service_id: &str,
    ) -> StoreResult<Option<UserServicePolicy>>;

    async fn list_policies_for_user(&self, user_id: &str) -> StoreResult<Vec<UserServicePolicy>>;

    async fn upsert_policy(
        &self,
        user_id: &str,
        service_id: &str,
        patch: &PolicyPatch,
    ) -> StoreResult<UserServicePolicy>;

    async fn insert_access_log(&self, entry: AccessLogEntry) -> StoreResult<()>;

    /// Matching entries, newest first.
    async fn query_access_logs(&self, query: &LogQuery) -> StoreResult<Page<AccessLogEntry>>;
}
