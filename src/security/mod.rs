//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Authenticated request (user, service):
//!     → policy.rs (user override ?? service default)
//!     → rate_limit.rs (fixed window per user+service)
//!     → headers.rs (strip Host/Content-Length, add X-Forwarded-*, X-Gateway-*)
//!     → Pass to forwarder
//! ```
//!
//! # Design Decisions
//! - Fail closed: an explicit deny stops the request before any counting
//! - Policy evaluation is pure; the store lookup belongs to the caller
//! - No trust in client-supplied gateway identity headers

pub mod headers;
pub mod policy;
pub mod rate_limit;

pub use policy::EffectivePolicy;
pub use rate_limit::{RateLimitDecision, RateLimitKey, RateLimiter};
