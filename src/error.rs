//! Gate-level error type.
//!
//! Every way a gated request can end other than a forwarded upstream
//! response. Each variant maps to exactly one HTTP response (see
//! `http::response`) and at most one [`BlockedReason`].

use thiserror::Error;

use crate::http::forward::UpstreamError;
use crate::store::{BlockedReason, StoreError};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing Host header")]
    MissingHost,

    #[error("no upstream configured for {host}")]
    NoUpstream {
        host: String,
        /// Names the configuration that should contain the host.
        hint: String,
    },

    #[error("no session, redirecting to {location}")]
    NoSession { location: String },

    #[error("forbidden by policy")]
    PolicyDenied,

    #[error("rate limit of {limit} exceeded, retry after {retry_after}s")]
    RateLimited { limit: u32, retry_after: u64 },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// Reason recorded in the access log. Store failures are not a policy
    /// outcome and carry none.
    pub fn blocked_reason(&self) -> Option<BlockedReason> {
        match self {
            GatewayError::MissingHost => Some(BlockedReason::MissingHost),
            GatewayError::NoUpstream { .. } => Some(BlockedReason::NoService),
            GatewayError::NoSession { .. } => Some(BlockedReason::NoSession),
            GatewayError::PolicyDenied => Some(BlockedReason::Deny),
            GatewayError::RateLimited { .. } => Some(BlockedReason::RateLimit),
            GatewayError::Upstream(_) => Some(BlockedReason::UpstreamError),
            GatewayError::Store(_) => None,
        }
    }
}
