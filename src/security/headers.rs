//! Header manipulation for forwarded requests.
//!
//! # Responsibilities
//! - Drop `Host` and `Content-Length` (the client connection recomputes them)
//! - Add X-Forwarded-Host, X-Forwarded-Proto, X-Forwarded-Uri
//! - Add the gateway identity headers (user id, service id)
//! - Extract the client IP for audit records
//!
//! # Design Decisions
//! - Rewriting works on the owned header map taken out of the request parts
//! - Client-supplied X-Gateway-* values are overwritten, never trusted

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use std::net::SocketAddr;

pub static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub static X_FORWARDED_URI: HeaderName = HeaderName::from_static("x-forwarded-uri");
pub static X_GATEWAY_USER_ID: HeaderName = HeaderName::from_static("x-gateway-user-id");
pub static X_GATEWAY_SERVICE_ID: HeaderName = HeaderName::from_static("x-gateway-service-id");

/// Who and what a forwarded request is for.
#[derive(Debug, Clone, Copy)]
pub struct ForwardIdentity<'a> {
    /// Normalized inbound host.
    pub host: &'a str,
    /// Scheme of the upstream URL.
    pub proto: &'a str,
    /// Original path and query, byte-for-byte.
    pub uri: &'a str,
    pub user_id: &'a str,
    pub service_id: &'a str,
}

/// Apply the proxy header rules to `headers` in place.
pub fn rewrite_forward_headers(
    headers: &mut HeaderMap,
    identity: &ForwardIdentity<'_>,
) -> Result<(), InvalidHeaderValue> {
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    headers.insert(X_FORWARDED_HOST.clone(), HeaderValue::from_str(identity.host)?);
    headers.insert(X_FORWARDED_PROTO.clone(), HeaderValue::from_str(identity.proto)?);
    headers.insert(X_FORWARDED_URI.clone(), HeaderValue::from_str(identity.uri)?);
    headers.insert(X_GATEWAY_USER_ID.clone(), HeaderValue::from_str(identity.user_id)?);
    headers.insert(X_GATEWAY_SERVICE_ID.clone(), HeaderValue::from_str(identity.service_id)?);
    Ok(())
}

/// Best-effort client address: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the TCP peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return Some(ip.to_string());
    }

    peer.map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ForwardIdentity<'static> {
        ForwardIdentity {
            host: "svc.example.com",
            proto: "http",
            uri: "/a/b?x=1&y=%20",
            user_id: "user-1",
            service_id: "service-1",
        }
    }

    #[test]
    fn test_rewrite_sets_and_strips() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("svc.example.com"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session=abc"));
        headers.insert("x-gateway-user-id", HeaderValue::from_static("spoofed"));

        rewrite_forward_headers(&mut headers, &identity()).unwrap();

        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
        assert_eq!(headers.get(header::COOKIE).unwrap(), "session=abc");
        assert_eq!(headers.get(&X_FORWARDED_HOST).unwrap(), "svc.example.com");
        assert_eq!(headers.get(&X_FORWARDED_PROTO).unwrap(), "http");
        assert_eq!(headers.get(&X_FORWARDED_URI).unwrap(), "/a/b?x=1&y=%20");
        assert_eq!(headers.get(&X_GATEWAY_USER_ID).unwrap(), "user-1");
        assert_eq!(headers.get_all(&X_GATEWAY_USER_ID).iter().count(), 1);
        assert_eq!(headers.get(&X_GATEWAY_SERVICE_ID).unwrap(), "service-1");
    }

    #[test]
    fn test_rewrite_rejects_unencodable_values() {
        let mut headers = HeaderMap::new();
        let bad = ForwardIdentity {
            user_id: "line\nbreak",
            ..identity()
        };
        assert!(rewrite_forward_headers(&mut headers, &bad).is_err());
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.9"));

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("198.51.100.4"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("203.0.113.7"));

        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
