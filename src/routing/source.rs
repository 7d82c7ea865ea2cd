//! Declarative host → upstream source.
//!
//! The source is the source of truth for which hosts exist. It is re-read on
//! every reconciliation so edits take effect without a restart.
//!
//! Wire shape (env var or file):
//! ```json
//! {"svc1.example.com": {"upstream": "http://svc1:8080"}}
//! ```

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::config::schema::{ServicesConfig, SourceKind};

/// One host mapping from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub host: String,
    pub upstream: String,
}

/// Failure to read the source. Never fatal: callers treat it as an empty source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed service source: {0}")]
    Json(#[from] serde_json::Error),

    #[error("service source must be a JSON object of host -> {{\"upstream\": ...}}")]
    NotAnObject,
}

#[derive(Debug, Clone)]
pub enum ServiceSource {
    /// JSON in an environment variable.
    Env(String),
    /// JSON in a file.
    File(PathBuf),
    /// Entries from the gateway config file itself.
    Inline(Vec<SourceEntry>),
}

impl ServiceSource {
    pub fn from_config(config: &ServicesConfig) -> Self {
        match config.source {
            SourceKind::Env => ServiceSource::Env(config.env_var.clone()),
            SourceKind::File => ServiceSource::File(config.path.clone().unwrap_or_default()),
            SourceKind::Inline => ServiceSource::Inline(
                config
                    .hosts
                    .iter()
                    .filter_map(|(host, entry)| normalize_entry(host, Some(&entry.upstream)))
                    .collect(),
            ),
        }
    }

    /// Read and parse the current mapping.
    pub async fn load(&self) -> Result<Vec<SourceEntry>, SourceError> {
        match self {
            ServiceSource::Env(var) => match std::env::var(var) {
                Ok(raw) => parse_services(&raw),
                Err(_) => Err(SourceError::MissingEnv(var.clone())),
            },
            ServiceSource::File(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| SourceError::Io {
                        path: path.clone(),
                        source,
                    })?;
                parse_services(&raw)
            }
            ServiceSource::Inline(entries) => Ok(entries.clone()),
        }
    }

    /// Path to watch for changes, when the source is a file.
    pub fn watched_path(&self) -> Option<&Path> {
        match self {
            ServiceSource::File(path) => Some(path.as_path()),
            _ => None,
        }
    }

    /// Operator-facing hint on where a missing host should be configured.
    pub fn describe(&self) -> String {
        match self {
            ServiceSource::Env(var) => format!(
                "Set {var} JSON env (e.g. {{\"a.com\":{{\"upstream\":\"http://a:8080\"}}}})."
            ),
            ServiceSource::File(path) => format!(
                "Add it to {} (e.g. {{\"a.com\":{{\"upstream\":\"http://a:8080\"}}}}).",
                path.display()
            ),
            ServiceSource::Inline(_) => {
                "Add a [services.hosts.\"<host>\"] entry with an upstream to the gateway config."
                    .to_string()
            }
        }
    }
}

/// Parse the JSON mapping. Blank input is an empty source, not an error.
///
/// Entries without a usable upstream are skipped with a warning rather than
/// failing the whole source.
pub fn parse_services(raw: &str) -> Result<Vec<SourceEntry>, SourceError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let parsed: Value = serde_json::from_str(raw)?;
    let Value::Object(map) = parsed else {
        return Err(SourceError::NotAnObject);
    };

    // BTreeMap keeps the result ordered by host and collapses duplicates that
    // only differ in case.
    let mut entries = BTreeMap::new();
    for (host, value) in &map {
        let upstream = value.get("upstream").and_then(Value::as_str);
        if let Some(entry) = normalize_entry(host, upstream) {
            entries.insert(entry.host.clone(), entry);
        }
    }
    Ok(entries.into_values().collect())
}

fn normalize_entry(host: &str, upstream: Option<&str>) -> Option<SourceEntry> {
    let host = host.trim().to_ascii_lowercase();
    let upstream = upstream.map(str::trim).unwrap_or_default();
    if host.is_empty() || upstream.is_empty() {
        tracing::warn!(host = %host, "Skipping service entry without host or upstream");
        return None;
    }

    match Url::parse(upstream) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Some(SourceEntry {
            host,
            upstream: upstream.to_string(),
        }),
        Ok(url) => {
            tracing::warn!(
                host = %host,
                upstream = %upstream,
                scheme = url.scheme(),
                "Skipping service entry: upstream must be an absolute http:// or https:// URL"
            );
            None
        }
        Err(e) => {
            tracing::warn!(host = %host, upstream = %upstream, error = %e, "Skipping service entry with invalid upstream");
            None
        }
    }
}
