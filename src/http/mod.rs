//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID + trace layers)
//!     → gate.rs (host → service → session → policy → rate limit)
//!     → forward.rs (stream to upstream, pass response through)
//!     → response.rs (rejections as HTTP responses)
//!     → Send to client
//! ```

pub mod forward;
pub mod gate;
pub mod request;
pub mod response;
pub mod server;

pub use forward::{RequestForwarder, UpstreamError};
pub use gate::GatewayState;
pub use request::X_REQUEST_ID;
pub use server::{GatewayDeps, GatewayServer};
