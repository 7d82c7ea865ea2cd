//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and value ranges
//! - Check that the chosen service source is fully specified
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, SourceKind, PLACEHOLDER_API_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new("timeouts.upstream_secs", "must be greater than 0"));
    }

    match config.services.source {
        SourceKind::Env if config.services.env_var.trim().is_empty() => {
            errors.push(ValidationError::new("services.env_var", "required when source = \"env\""));
        }
        SourceKind::File if config.services.path.is_none() => {
            errors.push(ValidationError::new("services.path", "required when source = \"file\""));
        }
        _ => {}
    }

    check_http_url(&mut errors, "auth.session_url", &config.auth.session_url);
    if config.auth.timeout_secs == 0 {
        errors.push(ValidationError::new("auth.timeout_secs", "must be greater than 0"));
    }
    let login = config.auth.login_url.trim();
    if !(login.starts_with('/') || Url::parse(login).is_ok()) {
        errors.push(ValidationError::new(
            "auth.login_url",
            "must be an absolute path or an absolute URL",
        ));
    }

    if let Some(upstream) = &config.frontend.upstream {
        check_http_url(&mut errors, "frontend.upstream", upstream);
    }

    if config.audit.queue_capacity == 0 {
        errors.push(ValidationError::new("audit.queue_capacity", "must be greater than 0"));
    }

    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_socket_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() || config.admin.api_key == PLACEHOLDER_API_KEY {
            errors.push(ValidationError::new("admin.api_key", "must be set when the admin API is enabled"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address '{value}'")));
    }
}

fn check_http_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
        Ok(_) => errors.push(ValidationError::new(
            field,
            "must be an absolute http:// or https:// URL",
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL '{value}': {e}"))),
    }
}
