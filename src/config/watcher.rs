//! Configuration file watcher for hot reload.
//!
//! The watcher does not parse anything itself: it raises the agent's
//! reload flag and the scheduler reloads at the next safe point.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lifecycle::signals::ReloadFlag;

/// Watches a config file and requests a reload when it changes.
pub struct ConfigWatcher {
    path: PathBuf,
    reload: ReloadFlag,
}

impl ConfigWatcher {
    pub fn new(path: &Path, reload: ReloadFlag) -> Self {
        Self {
            path: path.to_path_buf(),
            reload,
        }
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let reload = self.reload.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reload requested");
                        reload.request();
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_modification_raises_reload_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confd.toml");
        std::fs::write(&path, "[global]\n").unwrap();

        let flag = ReloadFlag::new();
        let _handle = ConfigWatcher::new(&path, flag.clone()).run().unwrap();

        std::fs::write(&path, "[global]\ninterval_secs = 5\n").unwrap();

        let mut seen = false;
        for _ in 0..50 {
            if flag.take() {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(seen, "watcher should request a reload after a write");
    }
}
