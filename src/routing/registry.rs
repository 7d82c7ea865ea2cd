//! Host → service resolution backed by the store and a reconciled snapshot.
//!
//! # Responsibilities
//! - Reconcile the store's service table against the declarative source
//! - Resolve request hosts to services
//! - Keep an in-process snapshot fresh (background refresh or per lookup)
//!
//! # Design Decisions
//! - Reconciliation is upsert + retain, so concurrent runs converge
//! - An unreadable or empty source leaves the store untouched
//! - With a refresh interval, lookups never touch the source or the store;
//!   unknown hosts cannot trigger reconciliation

use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::observability::metrics;
use crate::routing::source::ServiceSource;
use crate::store::{Service, Store, StoreResult};

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub upserted: usize,
    pub removed: usize,
}

pub struct ServiceRegistry {
    store: Arc<dyn Store>,
    source: ServiceSource,
    /// `None` reconciles on every lookup.
    refresh_interval: Option<Duration>,
    /// host -> service, swapped wholesale on refresh.
    snapshot: ArcSwap<HashMap<String, Service>>,
}

impl ServiceRegistry {
    pub fn new(store: Arc<dyn Store>, source: ServiceSource, refresh_interval_secs: u64) -> Self {
        let refresh_interval = match refresh_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            store,
            source,
            refresh_interval,
            snapshot: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn source(&self) -> &ServiceSource {
        &self.source
    }

    /// Make the store's service table match the source.
    pub async fn reconcile(&self) -> StoreResult<ReconcileReport> {
        let entries = match self.source.load().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Service source unreadable, treating as empty");
                Vec::new()
            }
        };

        if entries.is_empty() {
            tracing::debug!("Service source is empty, keeping stored services");
            return Ok(ReconcileReport::default());
        }

        for entry in &entries {
            self.store.upsert_service(&entry.host, &entry.upstream).await?;
        }

        let hosts: Vec<String> = entries.into_iter().map(|e| e.host).collect();
        let removed = self.store.retain_services(&hosts).await?;
        if removed > 0 {
            tracing::info!(removed, "Removed services no longer present in source");
        }

        Ok(ReconcileReport {
            upserted: hosts.len(),
            removed,
        })
    }

    /// Resolve a normalized host to its service.
    pub async fn resolve(&self, host: &str) -> StoreResult<Option<Service>> {
        if self.refresh_interval.is_none() {
            self.reconcile().await?;
            return self.store.find_service_by_host(host).await;
        }
        Ok(self.snapshot.load().get(host).cloned())
    }

    /// Reload the snapshot from the store without reading the source.
    pub async fn refresh_snapshot(&self) -> StoreResult<()> {
        let services = self.store.list_services().await?;
        metrics::record_services(services.len());
        let map = services.into_iter().map(|s| (s.host.clone(), s)).collect();
        self.snapshot.store(Arc::new(map));
        Ok(())
    }

    /// Reconcile now and publish the result to lookups.
    pub async fn invalidate(&self) -> StoreResult<ReconcileReport> {
        let report = self.reconcile().await?;
        self.refresh_snapshot().await?;
        tracing::debug!(upserted = report.upserted, removed = report.removed, "Service registry refreshed");
        Ok(report)
    }

    /// Periodically reconcile until shutdown. Returns immediately when the
    /// registry reconciles per lookup.
    pub async fn run_refresh(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let Some(interval) = self.refresh_interval else {
            return;
        };

        tracing::info!(interval_secs = interval.as_secs(), "Service refresh task starting");
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.invalidate().await {
                        tracing::error!(error = %e, "Service refresh failed, keeping previous snapshot");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Service refresh task received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
