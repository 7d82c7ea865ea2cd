//! Services file watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Monitors the services file and signals when it changes.
///
/// The parent directory is watched rather than the file itself: editors that
/// save by writing a temp file and renaming it over the original replace the
/// inode, and a watch on the old inode goes silent.
///
/// The watcher only signals; the receiver decides how to reconcile, so
/// parsing and store writes stay on the async runtime.
pub struct SourceWatcher {
    path: PathBuf,
    change_tx: mpsc::UnboundedSender<()>,
}

impl SourceWatcher {
    /// Create a new SourceWatcher.
    ///
    /// Returns the watcher and a receiver for change notifications.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();
        let file_name = self.path.file_name().map(OsStr::to_os_string);
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if touches_file(&event, file_name.as_deref()) {
                        tracing::info!("Services file change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, dir = ?dir, "Services file watcher started");
        Ok(watcher)
    }
}

/// A write, create or rename that lands on the watched file name. Events for
/// siblings in the same directory are ignored.
fn touches_file(event: &Event, file_name: Option<&OsStr>) -> bool {
    if !(event.kind.is_modify() || event.kind.is_create()) {
        return false;
    }
    match file_name {
        Some(name) => event.paths.iter().any(|p| p.file_name() == Some(name)),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
    use notify::EventKind;

    #[test]
    fn test_filters_events_by_file_name() {
        let name = OsStr::new("services.json");

        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/etc/gw/services.json"));
        assert!(touches_file(&create, Some(name)));

        let renamed_over = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/etc/gw/.services.json.swp"))
            .add_path(PathBuf::from("/etc/gw/services.json"));
        assert!(touches_file(&renamed_over, Some(name)));

        let sibling = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("/etc/gw/other.json"));
        assert!(!touches_file(&sibling, Some(name)));

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(PathBuf::from("/etc/gw/services.json"));
        assert!(!touches_file(&removed, Some(name)));
    }

    #[tokio::test]
    async fn test_signals_after_rename_over_file() {
        let dir = std::env::temp_dir().join(format!("gatefront-watch-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("services.json");
        std::fs::write(&path, "{}").unwrap();

        let (watcher, mut changes) = SourceWatcher::new(&path);
        let _watcher = watcher.run().unwrap();

        let staged = dir.join("services.json.tmp");
        std::fs::write(&staged, r#"{"a.com":{"upstream":"http://a:1"}}"#).unwrap();
        std::fs::rename(&staged, &path).unwrap();

        let signalled = tokio::time::timeout(Duration::from_secs(5), changes.recv()).await;
        std::fs::remove_dir_all(&dir).unwrap_or_default();
        assert!(matches!(signalled, Ok(Some(()))));
    }
}
