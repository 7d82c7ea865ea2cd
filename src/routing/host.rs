//! Host extraction from inbound requests.
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110), so hosts are lower-cased
//! - The port is never part of the routing key
//! - HTTP/2 requests carry the host in `:authority`, surfaced as the URI authority

use axum::http::{header, HeaderMap, Uri};

/// Strip the port from a `Host` header value and normalize it.
///
/// Returns `None` for empty values. Bracketed IPv6 literals keep their
/// brackets: `[::1]:8080` becomes `[::1]`.
pub fn parse_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let host = if raw.starts_with('[') {
        match raw.find(']') {
            Some(end) => &raw[..=end],
            None => raw,
        }
    } else {
        raw.split(':').next().unwrap_or_default()
    };

    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// The routing host of a request: the `Host` header, falling back to the URI
/// authority.
pub fn request_host(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    match headers.get(header::HOST) {
        Some(value) => value.to_str().ok().and_then(parse_host),
        None => uri.authority().and_then(|a| parse_host(a.as_str())),
    }
}
