//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): method, normalized path, status
//! - `http_request_duration_seconds` (histogram): same labels
//! - `auth_events_total` (counter): result, reason
//! - `rate_limit_hits_total` (counter): masked client IP
//! - `audit_events_total` (counter): admin mutation type
//! - `audit_entries_dropped_total` (counter): reason
//! - `upstream_errors_total` (counter): kind
//! - `gateway_services` (gauge): services in the registry snapshot
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade: lock-free, never fails,
//!   no-op until a recorder is installed
//! - Path labels collapse UUID and numeric segments to bound cardinality

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;
use uuid::Uuid;

const DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.3, 0.5, 1.0, 3.0, 5.0, 10.0];

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        );

    let result = builder.and_then(|b| b.install());
    match result {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// One observation per finished request.
pub fn record_request(method: &str, path: &str, status: u16, start: Instant) {
    let path = normalize_path(path);
    let status = status.to_string();
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.clone(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

/// `result` is `success` or `failure`.
pub fn record_auth_event(result: &'static str, reason: &'static str) {
    counter!("auth_events_total", "result" => result, "reason" => reason).increment(1);
}

pub fn record_rate_limited(client_ip: Option<&str>) {
    counter!("rate_limit_hits_total", "client_ip_masked" => mask_client_ip(client_ip)).increment(1);
}

pub fn record_audit_event(kind: &'static str) {
    counter!("audit_events_total", "type" => kind).increment(1);
}

pub fn record_audit_dropped(reason: &'static str) {
    counter!("audit_entries_dropped_total", "reason" => reason).increment(1);
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_services(count: usize) {
    gauge!("gateway_services").set(count as f64);
}

/// Collapse hyphenated UUID segments to `:uuid` and all-digit segments to `:id`.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.len() == 36 && Uuid::try_parse(segment).is_ok() {
                ":uuid"
            } else if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// IPv4 masked to its /24, IPv6 to its first four groups; anything else is
/// `unknown`.
pub fn mask_client_ip(ip: Option<&str>) -> String {
    let Some(ip) = ip else {
        return "unknown".to_string();
    };

    if let Ok(v4) = ip.parse::<Ipv4Addr>() {
        let [a, b, c, _] = v4.octets();
        return format!("{a}.{b}.{c}.0/24");
    }

    if ip.contains(':') {
        let groups: Vec<&str> = ip.split(':').filter(|g| !g.is_empty()).take(4).collect();
        return format!("{}::/64", groups.join(":"));
    }

    "unknown".to_string()
}
