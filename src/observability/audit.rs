//! Asynchronous access-log sink.
//!
//! Request handlers hand entries to a bounded queue and return immediately;
//! a single worker writes them to the store. When the queue is full the new
//! entry is dropped and counted, so a slow store never stalls traffic.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::store::{AccessLogEntry, Store};

#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AccessLogEntry>,
}

impl AuditSink {
    /// Start the writer task. It exits once every sink clone is dropped and
    /// the queue has drained.
    pub fn spawn(store: Arc<dyn Store>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AccessLogEntry>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let id = entry.id.clone();
                if let Err(e) = store.insert_access_log(entry).await {
                    tracing::warn!(entry_id = %id, error = %e, "Failed to persist access log entry");
                }
            }
            tracing::debug!("Audit writer drained, exiting");
        });

        (Self { tx }, handle)
    }

    /// Enqueue without waiting. Returns false if the entry was dropped.
    pub fn record(&self, entry: AccessLogEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(entry)) => {
                tracing::warn!(host = %entry.host, path = %entry.path, "Audit queue full, dropping entry");
                metrics::record_audit_dropped("queue_full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metrics::record_audit_dropped("closed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LogQuery, MemoryStore};
    use chrono::Utc;

    fn entry(path: &str) -> AccessLogEntry {
        AccessLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            host: "svc.example.com".into(),
            path: path.into(),
            method: "GET".into(),
            status: 200,
            upstream: Some("http://127.0.0.1:9000".into()),
            blocked_reason: None,
            user_id: Some("u1".into()),
            service_id: Some("s1".into()),
            ip: None,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn test_entries_reach_store() {
        let store = Arc::new(MemoryStore::default());
        let (sink, handle) = AuditSink::spawn(store.clone(), 8);

        assert!(sink.record(entry("/a")));
        assert!(sink.record(entry("/b")));
        drop(sink);
        handle.await.unwrap();

        let page = store
            .query_access_logs(&LogQuery { limit: 10, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_queue_drops_new_entries() {
        let store = Arc::new(MemoryStore::default());
        let (sink, handle) = AuditSink::spawn(store.clone(), 1);

        // The worker cannot run until this task yields, so the second send
        // finds the queue full.
        assert!(sink.record(entry("/kept")));
        assert!(!sink.record(entry("/dropped")));
        drop(sink);
        handle.await.unwrap();

        let page = store
            .query_access_logs(&LogQuery { limit: 10, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].path, "/kept");
    }
}
