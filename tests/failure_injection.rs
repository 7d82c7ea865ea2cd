//! Failure injection tests: dead upstreams, slow upstreams, broken session
//! backends and the reserved frontend paths.

use reqwest::header::{COOKIE, HOST, LOCATION};
use std::time::Duration;

use gatefront::store::BlockedReason;

mod common;

use common::{
    client, start_gateway, start_programmable_backend, start_recording_backend, test_config,
    unused_addr, wait_for_logs,
};

#[tokio::test]
async fn test_dead_upstream_is_502() {
    let dead = unused_addr().await;
    let upstream = format!("http://{dead}");
    let gw = start_gateway(test_config(&[("svc.test", upstream.as_str())])).await;

    let res = client()
        .get(gw.url("/"))
        .header(HOST, "svc.test")
        .header(COOKIE, "session=alice")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    assert_eq!(res.text().await.unwrap(), "Upstream request failed");

    let logs = wait_for_logs(&gw.store, 1).await;
    assert_eq!(logs[0].blocked_reason, Some(BlockedReason::UpstreamError));
    assert_eq!(logs[0].status, 502);
    assert_eq!(logs[0].user_id.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_slow_upstream_is_504() {
    let addr = start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        ("200 OK", Vec::new(), "late".to_string())
    })
    .await;
    let upstream = format!("http://{addr}");
    let mut config = test_config(&[("svc.test", upstream.as_str())]);
    config.timeouts.upstream_secs = 1;
    let gw = start_gateway(config).await;

    let res = client()
        .get(gw.url("/slow"))
        .header(HOST, "svc.test")
        .header(COOKIE, "session=alice")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 504);
    assert_eq!(res.text().await.unwrap(), "Upstream timed out");

    let logs = wait_for_logs(&gw.store, 1).await;
    assert_eq!(logs[0].blocked_reason, Some(BlockedReason::UpstreamError));
    assert_eq!(logs[0].status, 504);
}

#[tokio::test]
async fn test_upstream_errors_are_passed_through_unchanged() {
    let addr = start_programmable_backend(|| async {
        ("503 Service Unavailable", vec!["Retry-After: 7".to_string()], "maintenance".to_string())
    })
    .await;
    let upstream = format!("http://{addr}");
    let gw = start_gateway(test_config(&[("svc.test", upstream.as_str())])).await;

    let res = client()
        .get(gw.url("/"))
        .header(HOST, "svc.test")
        .header(COOKIE, "session=alice")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 503);
    assert_eq!(res.headers()["retry-after"], "7");
    assert_eq!(res.text().await.unwrap(), "maintenance");

    // A response from the upstream is not a gateway failure.
    let logs = wait_for_logs(&gw.store, 1).await;
    assert_eq!(logs[0].blocked_reason, None);
    assert_eq!(logs[0].status, 503);
}

#[tokio::test]
async fn test_session_backend_failure_fails_closed() {
    let backend = start_recording_backend(200, "ok").await;
    let upstream = backend.url();
    let gw = start_gateway(test_config(&[("svc.test", upstream.as_str())])).await;

    let res = client()
        .get(gw.url("/private"))
        .header(HOST, "svc.test")
        .header(COOKIE, "session=broken")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 302);
    assert_eq!(res.headers()[LOCATION], "/_gatefront/auth/sign-in?redirect=%2Fprivate");
    assert!(backend.requests().is_empty());

    let logs = wait_for_logs(&gw.store, 1).await;
    assert_eq!(logs[0].blocked_reason, Some(BlockedReason::NoSession));
}

#[tokio::test]
async fn test_gateback_without_frontend_is_404_and_unaudited() {
    let backend = start_recording_backend(200, "ok").await;
    let upstream = backend.url();
    let gw = start_gateway(test_config(&[("svc.test", upstream.as_str())])).await;

    let res = client()
        .get(gw.url("/_gateback/auth/get-session"))
        .header(HOST, "svc.test")
        .header(COOKIE, "session=alice")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    // A gated request afterwards is the only audited one.
    let res = client()
        .get(gw.url("/"))
        .header(HOST, "svc.test")
        .header(COOKIE, "session=alice")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let logs = wait_for_logs(&gw.store, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].path, "/");
    assert!(backend.requests().iter().all(|r| !r.uri.starts_with("/_gateback")));
}

#[tokio::test]
async fn test_frontend_paths_are_forwarded_ungated() {
    let frontend = start_recording_backend(200, "sign in here").await;
    let mut config = test_config(&[]);
    config.frontend.upstream = Some(frontend.url());
    let gw = start_gateway(config).await;

    // No cookie and an unmapped host: the login page must still load.
    let res = client()
        .get(gw.url("/_gatefront/auth/sign-in?redirect=%2Fdash"))
        .header(HOST, "anything.test")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "sign in here");

    let requests = frontend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].uri, "/_gatefront/auth/sign-in?redirect=%2Fdash");
    assert!(requests[0].headers.get("x-gateway-user-id").is_none());
}

#[tokio::test]
async fn test_dead_frontend_is_502() {
    let dead = unused_addr().await;
    let mut config = test_config(&[]);
    config.frontend.upstream = Some(format!("http://{dead}"));
    let gw = start_gateway(config).await;

    let res = client()
        .get(gw.url("/_gateback/auth/get-session"))
        .header(HOST, "svc.test")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
}

#[tokio::test]
async fn test_login_redirect_without_frontend_does_not_loop() {
    let backend = start_recording_backend(200, "ok").await;
    let upstream = backend.url();
    let gw = start_gateway(test_config(&[("svc.test", upstream.as_str())])).await;

    let res = client()
        .get(gw.url("/dash"))
        .header(HOST, "svc.test")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 302);
    let location = res.headers()[LOCATION].to_str().unwrap().to_string();
    assert_eq!(location, "/_gatefront/auth/sign-in?redirect=%2Fdash");

    // Follow the redirect once, still without a session.
    let res = client()
        .get(gw.url(&location))
        .header(HOST, "svc.test")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    assert!(res.headers().get(LOCATION).is_none());
    assert!(backend.requests().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let logs = wait_for_logs(&gw.store, 1).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].path, "/dash");
    assert_eq!(logs[0].blocked_reason, Some(BlockedReason::NoSession));
}

#[tokio::test]
async fn test_https_upstream_is_routed_not_dropped() {
    let dead = unused_addr().await;
    let upstream = format!("https://{dead}");
    let gw = start_gateway(test_config(&[("tls.test", upstream.as_str())])).await;

    let res = client()
        .get(gw.url("/"))
        .header(HOST, "tls.test")
        .header(COOKIE, "session=alice")
        .send()
        .await
        .unwrap();

    // The service exists; only the connection fails.
    assert_eq!(res.status(), 502);
    assert_eq!(res.text().await.unwrap(), "Upstream request failed");

    let logs = wait_for_logs(&gw.store, 1).await;
    assert_eq!(logs[0].blocked_reason, Some(BlockedReason::UpstreamError));
    assert_eq!(logs[0].upstream.as_deref(), Some(upstream.as_str()));
}
