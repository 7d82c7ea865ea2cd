//! Session resolution.
//!
//! The gate never authenticates users itself. It asks a [`SessionResolver`]
//! whether the request's cookies belong to a signed-in user and gets back
//! the user's identity, or nothing.

pub mod http;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::http::HttpSessionResolver;

/// The signed-in user as reported by the auth backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: SessionUser,
}

impl Session {
    pub fn new(user: SessionUser) -> Self {
        Self { user }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("session lookup timed out")]
    Timeout,

    #[error("session lookup failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("session endpoint answered {0}")]
    Status(u16),

    #[error("failed to read session response: {0}")]
    Body(#[from] axum::Error),

    #[error("malformed session response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Looks up the session for an inbound request.
///
/// Implementations must only read headers; the request body belongs to the
/// upstream.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, SessionError>;
}
