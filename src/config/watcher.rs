//! Configuration file watcher for hot reload.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::store::ConfigStore;

/// Reloads a [`ConfigStore`] when its file changes.
pub struct ConfigWatcher {
    path: PathBuf,
    store: Arc<ConfigStore>,
}

impl ConfigWatcher {
    /// Watch the file behind `store`. `None` when the store has no file.
    pub fn new(store: Arc<ConfigStore>) -> Option<Self> {
        let path = store.config_file()?.to_path_buf();
        Some(Self { path, store })
    }

    /// Start watching in a background thread.
    ///
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let store = Arc::clone(&self.store);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        // Failures are logged by the store, which keeps the current set.
                        let _ = store.reload();
                    }
                }
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::ConfigOptions;
    use std::collections::BTreeMap;

    #[test]
    fn test_no_watcher_without_file() {
        let store = ConfigStore::load(ConfigOptions::default(), BTreeMap::new()).unwrap();
        assert!(ConfigWatcher::new(Arc::new(store)).is_none());
    }

    #[test]
    fn test_watcher_reloads_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[gateway]\nport = 9000\n").unwrap();

        let store = Arc::new(ConfigStore::load(ConfigOptions::from_file(&path), BTreeMap::new()).unwrap());
        let _watcher = ConfigWatcher::new(Arc::clone(&store)).unwrap().run().unwrap();

        std::fs::write(&path, "[gateway]\nport = 9100\n").unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while store.get_gateway_config().port != 9100 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(store.get_gateway_config().port, 9100);
    }
}
