//! Effective access policy for a (user, service) pair.
//!
//! Precedence per field: user override, then service default.

use crate::store::{Service, UserServicePolicy};

/// The policy the gate enforces for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectivePolicy {
    pub allow: bool,
    pub window_sec: Option<u32>,
    pub max: Option<u32>,
}

impl EffectivePolicy {
    /// `(window_sec, max)` when both are set and positive; otherwise the
    /// request is not rate limited.
    pub fn rate_limit(&self) -> Option<(u32, u32)> {
        match (self.window_sec, self.max) {
            (Some(window), Some(max)) if window > 0 && max > 0 => Some((window, max)),
            _ => None,
        }
    }
}

/// Combine a service's defaults with an optional per-user override.
pub fn resolve(service: &Service, policy: Option<&UserServicePolicy>) -> EffectivePolicy {
    EffectivePolicy {
        allow: policy
            .and_then(|p| p.allow)
            .unwrap_or(service.default_allow),
        window_sec: policy
            .and_then(|p| p.rate_limit_window_sec)
            .or(service.default_rate_limit_window_sec),
        max: policy
            .and_then(|p| p.rate_limit_max)
            .or(service.default_rate_limit_max),
    }
}
