//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared by value/Arc to all subsystems
//!
//! Services file (when services.source = "file"):
//!     watcher.rs detects change
//!     → ServiceRegistry::invalidate (reconcile + snapshot swap)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the service mapping is the only
//!   hot-reloaded input
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, AuditConfig, AuthConfig, FrontendConfig, GatewayConfig, HostEntry,
    ListenerConfig, LogFormat, ObservabilityConfig, RateLimitConfig, ServicesConfig,
    SourceKind, StoreConfig, TimeoutConfig,
};
