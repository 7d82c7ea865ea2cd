//! Shutdown coordination.

use tokio::sync::broadcast;

/// Fans one shutdown event out to every long-running task: the gateway and
/// admin listeners, the registry refresh loop and the services watcher.
///
/// Tasks subscribe before they start; a receiver created after
/// [`trigger`](Self::trigger) never sees the event.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber. Safe to call with none left.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Subscribers not yet dropped.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
