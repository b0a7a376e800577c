//! Configuration file watcher for hot reload.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Which config file changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigFile {
    Gslb,
    ClusterTable,
    ClusterConf,
}

/// Watches config files and reports which one changed.
///
/// Parent directories are watched rather than the files themselves, so
/// editors and deploy tools that replace a file by rename are still seen.
pub struct ConfigWatcher {
    files: Vec<(ConfigFile, PathBuf)>,
    update_tx: mpsc::UnboundedSender<ConfigFile>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for change notifications.
    pub fn new(files: Vec<(ConfigFile, PathBuf)>) -> (Self, mpsc::UnboundedReceiver<ConfigFile>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (Self { files, update_tx }, update_rx)
    }

    /// Start watching in a background thread.
    ///
    /// The returned watcher must be kept alive for events to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();

        let mut by_name: HashMap<(PathBuf, OsString), ConfigFile> = HashMap::new();
        for (kind, path) in &self.files {
            if let Some(name) = path.file_name() {
                by_name.insert((parent_dir(path), name.to_os_string()), *kind);
            }
        }

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    for path in &event.paths {
                        let Some(name) = path.file_name() else { continue };
                        let key = (parent_dir(path), name.to_os_string());
                        if let Some(kind) = by_name.get(&key) {
                            tracing::info!(file = ?kind, path = %path.display(), "Config file change detected");
                            let _ = tx.send(*kind);
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let mut dirs: Vec<PathBuf> = self.files.iter().map(|(_, p)| parent_dir(p)).collect();
        dirs.sort();
        dirs.dedup();
        for dir in &dirs {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }

        tracing::info!(files = self.files.len(), "Config watcher started");
        Ok(watcher)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    dir.canonicalize().unwrap_or(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detects_replaced_file() {
        let dir = std::env::temp_dir().join(format!(
            "cluster-balance-watch-{}-{}",
            std::process::id(),
            fastrand::u64(..)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let gslb = dir.join("gslb.json");
        std::fs::write(&gslb, "{}").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(vec![(ConfigFile::Gslb, gslb.clone())]);
        let _guard = watcher.run().unwrap();

        // give the backend a moment to register
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&gslb, "{\"changed\": true}").unwrap();

        let kind = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kind, ConfigFile::Gslb);

        std::fs::remove_dir_all(dir).ok();
    }
}
