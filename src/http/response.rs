//! Client-facing responses for requests the gate stops.
//!
//! # Responsibilities
//! - Map each `GatewayError` to its status, headers and body
//! - Build the login redirect with a same-origin return path
//!
//! # Design Decisions
//! - Bodies are short plain text; nothing internal leaks to the client
//! - Upstream timeouts are 504, every other upstream failure is 502

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::GatewayError;
use crate::http::forward::UpstreamError;

pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::MissingHost => {
                (StatusCode::BAD_REQUEST, "Missing Host header").into_response()
            }
            GatewayError::NoUpstream { host, hint } => (
                StatusCode::BAD_GATEWAY,
                format!("No upstream configured for {host}. {hint}"),
            )
                .into_response(),
            GatewayError::NoSession { location } => match HeaderValue::from_str(&location) {
                Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
                Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Invalid login redirect").into_response(),
            },
            GatewayError::PolicyDenied => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            GatewayError::RateLimited { limit, retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    (header::RETRY_AFTER, HeaderValue::from(retry_after)),
                    (X_RATELIMIT_LIMIT.clone(), HeaderValue::from(limit)),
                    (X_RATELIMIT_REMAINING.clone(), HeaderValue::from_static("0")),
                ],
                "Too Many Requests",
            )
                .into_response(),
            GatewayError::Upstream(UpstreamError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "Upstream timed out").into_response()
            }
            GatewayError::Upstream(_) => {
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
            GatewayError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

/// Login URL carrying `redirect=<path+query>`.
///
/// The return path always starts with `/`, so a login page that only
/// accepts such values can never be turned into an open redirect.
pub fn login_redirect(login_url: &str, path_and_query: &str) -> String {
    let return_to = if path_and_query.starts_with('/') {
        path_and_query.to_string()
    } else {
        format!("/{path_and_query}")
    };
    let encoded: String = url::form_urlencoded::byte_serialize(return_to.as_bytes()).collect();
    let separator = if login_url.contains('?') { '&' } else { '?' };
    format!("{login_url}{separator}redirect={encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_login_redirect() {
        assert_eq!(
            login_redirect("/_gatefront/auth/sign-in", "/dash"),
            "/_gatefront/auth/sign-in?redirect=%2Fdash"
        );
        assert_eq!(
            login_redirect("https://login.example.com/in?app=1", "/a?b=c&d=e"),
            "https://login.example.com/in?app=1&redirect=%2Fa%3Fb%3Dc%26d%3De"
        );
        assert_eq!(login_redirect("/in", "x"), "/in?redirect=%2Fx");
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GatewayError::MissingHost, StatusCode::BAD_REQUEST),
            (
                GatewayError::NoUpstream { host: "a.com".into(), hint: "hint".into() },
                StatusCode::BAD_GATEWAY,
            ),
            (GatewayError::NoSession { location: "/in".into() }, StatusCode::FOUND),
            (GatewayError::PolicyDenied, StatusCode::FORBIDDEN),
            (
                GatewayError::RateLimited { limit: 1, retry_after: 1 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                GatewayError::Upstream(UpstreamError::Timeout(Duration::from_secs(1))),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                GatewayError::Upstream(UpstreamError::InvalidUpstream("x".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_rate_limit_headers() {
        let response = GatewayError::RateLimited { limit: 5, retry_after: 42 }.into_response();
        let headers = response.headers();
        assert_eq!(headers[header::RETRY_AFTER], "42");
        assert_eq!(headers["x-ratelimit-limit"], "5");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
    }
}
