//! Session lookup against an HTTP auth endpoint.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use std::time::Duration;

use crate::http::forward::upstream_connector;

use super::{Session, SessionError, SessionResolver, SessionUser};

/// Session payloads are small; anything bigger is not a session.
const MAX_SESSION_BODY: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    user: Option<SessionUser>,
}

/// Resolves sessions by calling `GET <session_url>` with the caller's
/// `Cookie` header and nothing else.
///
/// A JSON body `{"user": {...}}` is a session. `null`, `{"user": null}` and
/// 401/403/404 mean "not signed in".
#[derive(Clone)]
pub struct HttpSessionResolver {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    endpoint: Uri,
    timeout: Duration,
}

impl HttpSessionResolver {
    pub fn new(session_url: &str, timeout: Duration) -> Result<Self, SessionError> {
        let endpoint: Uri = session_url
            .parse()
            .map_err(|_| SessionError::InvalidEndpoint(session_url.to_string()))?;
        if !matches!(endpoint.scheme_str(), Some("http" | "https")) || endpoint.authority().is_none() {
            return Err(SessionError::InvalidEndpoint(session_url.to_string()));
        }

        Ok(Self {
            client: Client::builder(TokioExecutor::new()).build(upstream_connector(timeout)),
            endpoint,
            timeout,
        })
    }
}

#[async_trait]
impl SessionResolver for HttpSessionResolver {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, SessionError> {
        // HTTP/2 clients may split cookies across several header fields.
        let cookies: Vec<&str> = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if cookies.is_empty() {
            return Ok(None);
        }
        let cookie = cookies.join("; ");

        let request = Request::builder()
            .method(Method::GET)
            .uri(self.endpoint.clone())
            .header(header::COOKIE, cookie)
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())
            .map_err(|_| SessionError::InvalidEndpoint(self.endpoint.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| SessionError::Timeout)??;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                return Ok(None)
            }
            status if !status.is_success() => return Err(SessionError::Status(status.as_u16())),
            _ => {}
        }

        let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_SESSION_BODY).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let envelope: Option<SessionEnvelope> = serde_json::from_slice(&body)?;
        Ok(envelope.and_then(|e| e.user).map(Session::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::{json, Value};

    async fn session_backend() -> String {
        async fn handler(headers: HeaderMap) -> (StatusCode, Json<Value>) {
            let cookie = headers
                .get(header::COOKIE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            match cookie {
                "session=alice" | "theme=dark; session=alice" => (
                    StatusCode::OK,
                    Json(json!({
                        "session": {"id": "s1"},
                        "user": {"id": "u-alice", "email": "alice@example.com", "name": "Alice", "role": "admin"}
                    })),
                ),
                "session=expired" => (StatusCode::UNAUTHORIZED, Json(Value::Null)),
                "session=broken" => (StatusCode::INTERNAL_SERVER_ERROR, Json(Value::Null)),
                _ => (StatusCode::OK, Json(Value::Null)),
            }
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/session", get(handler)))
                .await
                .unwrap();
        });
        format!("http://{addr}/session")
    }

    fn with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, value.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_resolves_sessions() {
        let url = session_backend().await;
        let resolver = HttpSessionResolver::new(&url, Duration::from_secs(2)).unwrap();

        let session = resolver.get_session(&with_cookie("session=alice")).await.unwrap().unwrap();
        assert_eq!(session.user.id, "u-alice");
        assert_eq!(session.user.role.as_deref(), Some("admin"));

        assert!(resolver.get_session(&with_cookie("session=none")).await.unwrap().is_none());
        assert!(resolver.get_session(&with_cookie("session=expired")).await.unwrap().is_none());
        assert!(matches!(
            resolver.get_session(&with_cookie("session=broken")).await,
            Err(SessionError::Status(500))
        ));
    }

    #[tokio::test]
    async fn test_split_cookie_headers_are_joined() {
        let url = session_backend().await;
        let resolver = HttpSessionResolver::new(&url, Duration::from_secs(2)).unwrap();

        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, "theme=dark".parse().unwrap());
        headers.append(header::COOKIE, "session=alice".parse().unwrap());

        let session = resolver.get_session(&headers).await.unwrap().unwrap();
        assert_eq!(session.user.id, "u-alice");
    }

    #[tokio::test]
    async fn test_no_cookie_skips_lookup() {
        // Nothing listens on this port; a lookup would fail.
        let resolver = HttpSessionResolver::new("http://127.0.0.1:9/session", Duration::from_millis(200)).unwrap();
        assert!(resolver.get_session(&HeaderMap::new()).await.unwrap().is_none());
    }

    #[test]
    fn test_endpoint_scheme() {
        assert!(HttpSessionResolver::new("https://auth.example.com/session", Duration::from_secs(1)).is_ok());
        assert!(HttpSessionResolver::new("ftp://auth.example.com/session", Duration::from_secs(1)).is_err());
        assert!(HttpSessionResolver::new("/relative", Duration::from_secs(1)).is_err());
    }
}
