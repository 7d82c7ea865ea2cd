//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use gatefront::config::{GatewayConfig, HostEntry, SourceKind};
use gatefront::routing::ServiceRegistry;
use gatefront::session::{Session, SessionError, SessionResolver, SessionUser};
use gatefront::store::{AccessLogEntry, LogQuery, MemoryStore, Service, Store};
use gatefront::{GatewayDeps, GatewayServer, Shutdown};

/// One request as seen by a mock upstream.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    /// Origin-form target, exactly as received.
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

pub struct RecordingBackend {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl RecordingBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().unwrap().clone()
    }
}

/// Start an upstream that records every request and answers `status` with
/// `body` and an `x-backend: recorded` header.
pub async fn start_recording_backend(status: u16, body: &'static str) -> RecordingBackend {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();

    let app = Router::new().fallback(move |request: Request<Body>| {
        let sink = sink.clone();
        async move {
            let (parts, body_in) = request.into_parts();
            let bytes = axum::body::to_bytes(body_in, usize::MAX).await.unwrap_or_default();
            sink.lock().unwrap().push(CapturedRequest {
                method: parts.method.to_string(),
                uri: parts.uri.to_string(),
                headers: parts.headers,
                body: bytes.to_vec(),
            });
            (
                StatusCode::from_u16(status).unwrap(),
                [("x-backend", "recorded")],
                body,
            )
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    RecordingBackend { addr, captured }
}

/// Start a raw programmable backend. `f` yields the full status line
/// (e.g. `302 Found`), extra header lines and the body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (&'static str, Vec<String>, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let (status_line, headers, body) = f().await;
                        let mut response = format!("HTTP/1.1 {status_line}\r\n");
                        for header in headers {
                            response.push_str(&header);
                            response.push_str("\r\n");
                        }
                        response.push_str(&format!(
                            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        ));
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Sessions keyed by cookie: `session=<user id>` is that user, `session=broken`
/// is a resolver failure, anything else is signed out.
pub struct CookieSessions;

#[async_trait]
impl SessionResolver for CookieSessions {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, SessionError> {
        let Some(cookie) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) else {
            return Ok(None);
        };
        let Some(user) = cookie
            .split(';')
            .map(str::trim)
            .find_map(|c| c.strip_prefix("session="))
        else {
            return Ok(None);
        };

        match user {
            "broken" => Err(SessionError::Status(500)),
            "" => Ok(None),
            id => Ok(Some(Session::new(SessionUser {
                id: id.to_string(),
                email: format!("{id}@example.com"),
                name: id.to_string(),
                role: None,
            }))),
        }
    }
}

/// Inline services, per-lookup reconciliation, no metrics listener.
pub fn test_config(hosts: &[(&str, &str)]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.services.source = SourceKind::Inline;
    config.services.refresh_interval_secs = 0;
    config.services.watch = false;
    for (host, upstream) in hosts {
        config.services.hosts.insert(
            host.to_string(),
            HostEntry {
                upstream: upstream.to_string(),
            },
        );
    }
    config.timeouts.connect_secs = 1;
    config.timeouts.upstream_secs = 5;
    config.observability.metrics_enabled = false;
    config
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    pub registry: Arc<ServiceRegistry>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Reconcile and return the stored service for `host`.
    pub async fn service(&self, host: &str) -> Service {
        self.registry.invalidate().await.unwrap();
        self.store.find_service_by_host(host).await.unwrap().unwrap()
    }
}

/// Build a gateway over a fresh `MemoryStore` without binding a socket.
pub fn build_gateway(config: &GatewayConfig) -> (GatewayServer, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let server = GatewayServer::new(
        config,
        GatewayDeps {
            store: store.clone(),
            sessions: Arc::new(CookieSessions),
        },
    );
    (server, store)
}

/// Start a gateway on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let (server, store) = build_gateway(&config);
    let registry = server.registry();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestGateway {
        addr,
        store,
        registry,
        shutdown,
    }
}

/// A client that never follows redirects and ignores system proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Poll the store until at least `count` access log entries exist.
pub async fn wait_for_logs(store: &MemoryStore, count: usize) -> Vec<AccessLogEntry> {
    let query = LogQuery {
        limit: 1000,
        ..Default::default()
    };
    for _ in 0..100 {
        let page = store.query_access_logs(&query).await.unwrap();
        if page.total >= count {
            return page.items;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {count} access log entries");
}
