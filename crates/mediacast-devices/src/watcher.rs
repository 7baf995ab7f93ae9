//! Device-directory watcher.
//!
//! Filesystem events are debounced, filtered to the device-file extension,
//! and handed to a [`ReloadHandler`] on the debouncer's own thread. The
//! handler updates the registry first and rebuilds live profiles after the
//! registry lock has been released.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};

use mediacast_common::{Error, Result};

use crate::connected::ConnectedProfiles;
use crate::registry::{DeviceRegistry, FileChange};

/// Applies one changed path to the registry and to live profiles.
#[derive(Debug, Clone)]
pub struct ReloadHandler {
    registry: Arc<DeviceRegistry>,
    profiles: Arc<ConnectedProfiles>,
}

impl ReloadHandler {
    pub fn new(registry: Arc<DeviceRegistry>, profiles: Arc<ConnectedProfiles>) -> Self {
        Self { registry, profiles }
    }

    /// Process a changed path. An existing file is reloaded; a missing one is
    /// unregistered. Returns the change, or `None` if nothing was applied
    /// (wrong extension, or the file failed to parse and the previous store
    /// was kept).
    pub fn handle_path(&self, path: &Path) -> Option<FileChange> {
        if !self.registry.is_device_file(path) {
            return None;
        }

        let change = if path.is_file() {
            match self.registry.load_file(path) {
                Ok(change) => {
                    tracing::info!(path = %path.display(), devices = ?change.current, "Reloaded device file");
                    change
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Device file failed to reload; keeping previous settings"
                    );
                    return None;
                }
            }
        } else {
            let change = self.registry.remove_file(path);
            if change.removed.is_empty() {
                return None;
            }
            tracing::info!(path = %path.display(), devices = ?change.removed, "Device file removed");
            change
        };

        self.profiles.rebuild_affected(&change);
        Some(change)
    }

    /// Process a debounced batch.
    pub fn handle_batch(&self, paths: impl IntoIterator<Item = PathBuf>) -> usize {
        let mut paths: Vec<PathBuf> = paths.into_iter().collect();
        paths.sort();
        paths.dedup();
        paths.iter().filter_map(|p| self.handle_path(p)).count()
    }
}

/// A running watch on the device directory. Dropping it stops the watch.
pub struct DeviceWatcher {
    dir: PathBuf,
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl std::fmt::Debug for DeviceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceWatcher").field("dir", &self.dir).finish()
    }
}

impl DeviceWatcher {
    /// Start watching `dir` (non-recursively), coalescing events over `debounce`.
    pub fn start(dir: &Path, debounce: Duration, handler: ReloadHandler) -> Result<Self> {
        let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| match res {
            Ok(events) => {
                handler.handle_batch(events.into_iter().map(|e| e.path));
            }
            Err(e) => tracing::warn!(error = %e, "Device directory watch error"),
        })
        .map_err(|e| Error::config_io(dir, format!("failed to create watcher: {e}")))?;

        debouncer
            .watcher()
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::config_io(dir, format!("failed to watch directory: {e}")))?;

        tracing::info!(dir = %dir.display(), debounce_ms = debounce.as_millis() as u64, "Watching device directory");
        Ok(Self {
            dir: dir.to_path_buf(),
            _debouncer: debouncer,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        tracing::info!(dir = %self.dir.display(), "Device watcher stopped");
    }
}
