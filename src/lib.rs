//! gatefront: host-based authenticating reverse proxy.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;
pub mod session;
pub mod store;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::{GatewayDeps, GatewayServer};
pub use lifecycle::Shutdown;
