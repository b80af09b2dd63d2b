//! Hot reload of the configuration file.
//!
//! The parent directory is watched rather than the file itself: editors that
//! save by writing a temporary file and renaming it over the original would
//! otherwise detach the watch after the first save. Events for other files in
//! the directory are ignored, and a write that leaves the content unchanged
//! does not produce a reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::GatewayConfig;
use crate::observability::metrics;

/// Sends a validated [`GatewayConfig`] each time the watched file changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of its update channel.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Reloads stop when the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.path.file_name().map(OsString::from);
        let last_applied = Mutex::new(std::fs::read_to_string(&self.path).ok());
        let path = self.path.clone();
        let tx = self.update_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !touches_file(&event, file_name.as_deref()) {
                    return;
                }

                let content = match std::fs::read_to_string(&path) {
                    Ok(content) => content,
                    // Mid-rename; the create event for the new file follows.
                    Err(_) => return,
                };
                let mut last = last_applied.lock().expect("config watcher mutex poisoned");
                if last.as_deref() == Some(content.as_str()) {
                    return;
                }

                tracing::info!(path = %path.display(), "Config file changed, reloading");
                match parse_config(&content) {
                    Ok(config) => {
                        *last = Some(content);
                        if tx.send(config).is_err() {
                            tracing::debug!("Config receiver gone, dropping update");
                        }
                    }
                    Err(e) => {
                        metrics::record_config_reload("failure");
                        tracing::error!(error = %e, "Rejected config change, keeping current configuration");
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

/// Whether `event` creates or modifies the file called `file_name`.
fn touches_file(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return false;
    }
    let Some(name) = file_name else {
        return false;
    };
    event.paths.iter().any(|p| p.file_name() == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_only_changes_to_the_config_file_count() {
        let name = Some(std::ffi::OsStr::new("gateway.toml"));
        assert!(touches_file(&event(EventKind::Modify(ModifyKind::Any), "/etc/gw/gateway.toml"), name));
        assert!(touches_file(&event(EventKind::Create(CreateKind::File), "/etc/gw/gateway.toml"), name));
        assert!(!touches_file(&event(EventKind::Modify(ModifyKind::Any), "/etc/gw/other.toml"), name));
        assert!(!touches_file(&event(EventKind::Remove(RemoveKind::File), "/etc/gw/gateway.toml"), name));
    }

    #[tokio::test]
    async fn test_new_returns_connected_channel() {
        let (watcher, mut rx) = ConfigWatcher::new(Path::new("gateway.toml"));
        watcher.update_tx.send(GatewayConfig::default()).unwrap();
        assert!(rx.recv().await.is_some());
    }
}
