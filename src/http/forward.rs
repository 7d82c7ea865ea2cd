//! Upstream forwarding.
//!
//! # Responsibilities
//! - Point the inbound request at the service's upstream origin
//! - Apply the forward header rules
//! - Stream the body both ways and pass the upstream response through
//!
//! # Design Decisions
//! - One pooled hyper client shared by all requests, speaking plain
//!   HTTP or TLS depending on the upstream scheme
//! - Redirects are returned to the client, never followed
//! - The upstream timeout covers time to response headers only; bodies
//!   stream for as long as the client keeps reading
//! - Dropping the returned future cancels the upstream request

use axum::body::Body;
use axum::http::header::InvalidHeaderValue;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, Uri, Version};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::security::headers::{rewrite_forward_headers, ForwardIdentity};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream URL '{0}'")]
    InvalidUpstream(String),

    #[error("request header cannot be forwarded: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
}

impl UpstreamError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::InvalidUpstream(_) => "invalid_upstream",
            UpstreamError::InvalidHeader(_) => "invalid_header",
            UpstreamError::Timeout(_) => "timeout",
            UpstreamError::Transport(_) => "transport",
        }
    }
}

/// Identity attached to a forwarded request. Reserved-path traffic carries
/// none.
#[derive(Debug, Clone, Copy)]
pub struct ForwardAs<'a> {
    pub host: &'a str,
    pub user_id: &'a str,
    pub service_id: &'a str,
}

/// Connector for `http://` and `https://` origins, verifying TLS against the
/// webpki root set.
pub(crate) fn upstream_connector(connect_timeout: Duration) -> HttpsConnector<HttpConnector> {
    let mut http = HttpConnector::new();
    http.set_connect_timeout(Some(connect_timeout));
    http.set_nodelay(true);
    http.enforce_http(false);

    HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .wrap_connector(http)
}

#[derive(Clone)]
pub struct RequestForwarder {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    upstream_timeout: Duration,
}

impl RequestForwarder {
    pub fn new(connect_timeout: Duration, upstream_timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(upstream_connector(connect_timeout));
        Self {
            client,
            upstream_timeout,
        }
    }

    /// Forward a gated request with the gateway identity headers.
    pub async fn forward(
        &self,
        request: Request<Body>,
        upstream: &str,
        identity: ForwardAs<'_>,
    ) -> Result<Response<Body>, UpstreamError> {
        let (mut parts, body) = request.into_parts();
        let origin = UpstreamOrigin::parse(upstream)?;
        let path_and_query = original_path_and_query(&parts.uri);

        rewrite_forward_headers(
            &mut parts.headers,
            &ForwardIdentity {
                host: identity.host,
                proto: origin.scheme.as_str(),
                uri: path_and_query.as_str(),
                user_id: identity.user_id,
                service_id: identity.service_id,
            },
        )?;

        parts.uri = origin.target(path_and_query)?;
        self.send(Request::from_parts(parts, body)).await
    }

    /// Forward without identity headers, only re-targeting the request.
    pub async fn forward_raw(
        &self,
        request: Request<Body>,
        upstream: &str,
    ) -> Result<Response<Body>, UpstreamError> {
        let (mut parts, body) = request.into_parts();
        let origin = UpstreamOrigin::parse(upstream)?;
        parts.headers.remove(axum::http::header::HOST);
        parts.uri = origin.target(original_path_and_query(&parts.uri))?;
        self.send(Request::from_parts(parts, body)).await
    }

    async fn send(&self, mut request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        // The pooled client speaks HTTP/1.1 to upstreams whatever the
        // inbound version was.
        *request.version_mut() = Version::HTTP_11;

        let response = tokio::time::timeout(self.upstream_timeout, self.client.request(request))
            .await
            .map_err(|_| UpstreamError::Timeout(self.upstream_timeout))??;

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

struct UpstreamOrigin {
    scheme: Scheme,
    authority: Authority,
}

impl UpstreamOrigin {
    fn parse(upstream: &str) -> Result<Self, UpstreamError> {
        let invalid = || UpstreamError::InvalidUpstream(upstream.to_string());

        let url = Url::parse(upstream).map_err(|_| invalid())?;
        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            _ => return Err(invalid()),
        };
        let host = url.host_str().ok_or_else(invalid)?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            scheme,
            authority: authority.parse().map_err(|_| invalid())?,
        })
    }

    fn target(&self, path_and_query: PathAndQuery) -> Result<Uri, UpstreamError> {
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|_| UpstreamError::InvalidUpstream(self.authority.to_string()))
    }
}

fn original_path_and_query(uri: &Uri) -> PathAndQuery {
    uri.path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_origin_keeps_only_scheme_and_authority() {
        let origin = UpstreamOrigin::parse("http://127.0.0.1:9000/ignored/base").unwrap();
        let uri = origin
            .target(PathAndQuery::from_static("/a%20b/c?x=1&y=%2F"))
            .unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:9000/a%20b/c?x=1&y=%2F");
    }

    #[test]
    fn test_upstream_origin_ipv6_and_default_port() {
        let origin = UpstreamOrigin::parse("http://[::1]:8080").unwrap();
        assert_eq!(origin.authority.as_str(), "[::1]:8080");

        let origin = UpstreamOrigin::parse("http://svc.internal").unwrap();
        assert_eq!(origin.authority.as_str(), "svc.internal");
    }

    #[test]
    fn test_https_upstream_keeps_scheme() {
        let origin = UpstreamOrigin::parse("https://svc.internal:8443").unwrap();
        assert_eq!(origin.scheme.as_str(), "https");
        let uri = origin.target(PathAndQuery::from_static("/x?y=1")).unwrap();
        assert_eq!(uri.to_string(), "https://svc.internal:8443/x?y=1");

        let origin = UpstreamOrigin::parse("https://svc.internal").unwrap();
        assert_eq!(origin.authority.as_str(), "svc.internal");
    }

    #[test]
    fn test_rejects_unsupported_upstreams() {
        assert!(matches!(
            UpstreamOrigin::parse("ftp://svc.internal"),
            Err(UpstreamError::InvalidUpstream(_))
        ));
        assert!(UpstreamOrigin::parse("not a url").is_err());
    }

    #[test]
    fn test_missing_path_defaults_to_root() {
        let uri: Uri = "http://svc.example.com".parse().unwrap();
        assert_eq!(original_path_and_query(&uri).as_str(), "/");
    }
}
