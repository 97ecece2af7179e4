//! Configuration file watcher for hot reload.
//!
//! Watches the proxy config and, when one is referenced, the
//! `darkvisitors { ... }` block file. A change to either reloads the whole
//! config. Parent directories are watched rather than the files themselves
//! so that editors replacing a file by rename are still seen.
//!
//! A reload that points `darkvisitors_file` somewhere new is followed as long
//! as the new file sits in an already watched directory; otherwise the change
//! takes effect once, and further edits need a restart.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load_config, visits_file_path};
use crate::config::schema::ProxyConfig;

/// Sends a freshly loaded [`ProxyConfig`] whenever a watched file changes.
pub struct ConfigWatcher {
    config_path: PathBuf,
    watched: Vec<PathBuf>,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// `current` is the config already loaded from `path`; it decides which
    /// block file, if any, is watched alongside.
    pub fn new(path: &Path, current: &ProxyConfig) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        let mut watched = vec![path.to_path_buf()];
        watched.extend(visits_file_path(path, current));

        let watcher = Self {
            config_path: path.to_path_buf(),
            watched,
            update_tx,
        };
        (watcher, update_rx)
    }

    pub fn watched_files(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Start watching. The returned handle must be kept alive.
    ///
    /// A config that fails to load is logged and dropped; the server keeps
    /// running with what it has.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let config_path = self.config_path;
        let mut files = self.watched.clone();
        let dirs: BTreeSet<PathBuf> = self.watched.iter().map(|p| watch_dir(p)).collect();
        let watched_dirs = dirs.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let Some(changed) = event.paths.iter().find(|p| is_watched(&files, p)) else {
                        return;
                    };
                    tracing::info!(path = %changed.display(), "Config file change detected, reloading");
                    match load_config(&config_path) {
                        Ok(new_config) => {
                            let (next, unwatched) = refresh_watched(&config_path, &watched_dirs, &new_config);
                            if let Some(block) = unwatched {
                                tracing::warn!(
                                    path = %block.display(),
                                    "Block file is outside the watched directories, edits to it need a restart"
                                );
                            }
                            files = next;
                            let _ = tx.send(new_config);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for dir in &dirs {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
        }

        tracing::info!(files = ?self.watched, "Config watcher started");
        Ok(watcher)
    }
}

/// Files to watch after `config` was loaded from `config_path`, plus the
/// block file when its directory is not among `dirs`.
fn refresh_watched(
    config_path: &Path,
    dirs: &BTreeSet<PathBuf>,
    config: &ProxyConfig,
) -> (Vec<PathBuf>, Option<PathBuf>) {
    let mut files = vec![config_path.to_path_buf()];
    let mut unwatched = None;
    if let Some(block) = visits_file_path(config_path, config) {
        if dirs.contains(&watch_dir(&block)) {
            files.push(block);
        } else {
            unwatched = Some(block);
        }
    }
    (files, unwatched)
}

fn watch_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Event paths are absolute while configured ones may not be, so compare by
/// file name within the same directory.
fn is_watched(files: &[PathBuf], changed: &Path) -> bool {
    files.iter().any(|file| {
        if file == changed {
            return true;
        }
        let same_name = file.file_name().is_some() && file.file_name() == changed.file_name();
        let same_dir = match (
            watch_dir(file).canonicalize(),
            changed.parent().map(Path::canonicalize),
        ) {
            (Ok(a), Some(Ok(b))) => a == b,
            _ => false,
        };
        same_name && same_dir
    })
}
