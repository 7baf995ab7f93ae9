//! The [`DeviceRegistry`]: identifiers to device-specific settings stores.
//!
//! Every identifier a device file declares maps to that file's store; aliases
//! in one file share a single `Arc` and are always replaced together. A
//! separate cross-reference table links network addresses to the stable ids
//! seen on them, in both directions.
//!
//! All state sits behind one mutex. File parsing happens before the lock is
//! taken, so lookups only ever wait for the publish step.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use mediacast_common::{DeviceIdentity, Error, Result};
use mediacast_settings::SettingsStore;

use crate::device_file;

/// Outcome of a directory scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    /// Files registered.
    pub files: usize,
    /// Identifiers registered across all files.
    pub ids: usize,
    /// Files skipped because they failed to load or declared nothing.
    pub skipped: Vec<PathBuf>,
}

/// What a single file reload or removal changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    /// Identifiers declared before and not after.
    pub removed: BTreeSet<String>,
    /// Identifiers declared after the change.
    pub current: BTreeSet<String>,
}

impl FileChange {
    /// Every identifier whose resolved store may have changed.
    pub fn affected(&self) -> BTreeSet<String> {
        self.removed.union(&self.current).cloned().collect()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    store: Arc<SettingsStore>,
    file: PathBuf,
}

#[derive(Debug, Default)]
struct Table {
    by_id: HashMap<String, Entry>,
    files: HashMap<PathBuf, BTreeSet<String>>,
    /// address -> stable id
    address_to_id: HashMap<String, String>,
    /// stable id -> address
    id_to_address: HashMap<String, String>,
}

impl Table {
    fn store_for(&self, key: &str) -> Option<Arc<SettingsStore>> {
        self.by_id.get(key).map(|e| e.store.clone())
    }

    /// Replace everything `path` declares with `ids -> store`, returning the change.
    fn publish(&mut self, path: &Path, store: Arc<SettingsStore>, ids: BTreeSet<String>) -> FileChange {
        let previous = self.files.remove(path).unwrap_or_default();
        let removed: BTreeSet<String> = previous.difference(&ids).cloned().collect();

        for id in &removed {
            if self.by_id.get(id).is_some_and(|e| e.file == path) {
                self.by_id.remove(id);
            }
        }

        for id in &ids {
            let entry = Entry {
                store: store.clone(),
                file: path.to_path_buf(),
            };
            if let Some(old) = self.by_id.insert(id.clone(), entry) {
                if old.file != path {
                    tracing::warn!(
                        device = %id,
                        previous = %old.file.display(),
                        current = %path.display(),
                        "Device id declared by more than one file; latest wins"
                    );
                    if let Some(ids) = self.files.get_mut(&old.file) {
                        ids.remove(id);
                    }
                }
            }
        }

        if !ids.is_empty() {
            self.files.insert(path.to_path_buf(), ids.clone());
        }

        FileChange {
            path: path.to_path_buf(),
            removed,
            current: ids,
        }
    }
}

/// Process-wide table of device-specific settings, constructed by the
/// composition root and shared by handle.
#[derive(Debug)]
pub struct DeviceRegistry {
    extension: String,
    table: Mutex<Table>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new("conf")
    }
}

impl DeviceRegistry {
    /// An empty registry recognizing files with `extension`.
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into().trim_start_matches('.').to_string(),
            table: Mutex::new(Table::default()),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Whether `path` looks like a device settings file.
    pub fn is_device_file(&self, path: &Path) -> bool {
        device_file::has_extension(path, &self.extension)
    }

    /// Scan `dir` and replace every file-backed registration with what it holds.
    ///
    /// Cross-references survive a rescan. Files that fail to load are logged
    /// and skipped; only an unreadable directory is an error.
    pub fn load_all(&self, dir: &Path) -> Result<LoadSummary> {
        let reader = std::fs::read_dir(dir).map_err(|e| Error::config_io(dir, e))?;

        let mut paths: Vec<PathBuf> = reader
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && self.is_device_file(p))
            .collect();
        paths.sort();

        let mut summary = LoadSummary::default();
        let mut fresh = Table::default();

        for path in paths {
            match load_device_file(&path) {
                Ok((store, ids)) if !ids.is_empty() => {
                    summary.files += 1;
                    fresh.publish(&path, store, ids);
                }
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "Device file declares no device ids; skipping");
                    summary.skipped.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to load device file");
                    summary.skipped.push(path);
                }
            }
        }
        summary.ids = fresh.by_id.len();

        {
            let mut table = self.table.lock();
            table.by_id = fresh.by_id;
            table.files = fresh.files;
        }

        tracing::info!(
            dir = %dir.display(),
            files = summary.files,
            ids = summary.ids,
            skipped = summary.skipped.len(),
            "Loaded device profiles"
        );
        Ok(summary)
    }

    /// Reload one file. On failure the previous registration is left untouched.
    pub fn load_file(&self, path: &Path) -> Result<FileChange> {
        let (store, ids) = load_device_file(path)?;
        if ids.is_empty() {
            tracing::warn!(path = %path.display(), "Device file no longer declares any device ids");
        }
        let change = self.table.lock().publish(path, store, ids);
        tracing::debug!(
            path = %path.display(),
            current = ?change.current,
            removed = ?change.removed,
            "Registered device file"
        );
        Ok(change)
    }

    /// Drop every identifier registered from `path`.
    pub fn remove_file(&self, path: &Path) -> FileChange {
        let mut table = self.table.lock();
        let ids = table.files.remove(path).unwrap_or_default();
        for id in &ids {
            if table.by_id.get(id).is_some_and(|e| e.file == path) {
                table.by_id.remove(id);
            }
        }
        FileChange {
            path: path.to_path_buf(),
            removed: ids,
            current: BTreeSet::new(),
        }
    }

    /// Register an in-memory or externally loaded store under `ids`.
    pub fn register(&self, path: &Path, store: Arc<SettingsStore>, ids: impl IntoIterator<Item = String>) -> FileChange {
        let ids = ids.into_iter().collect();
        self.table.lock().publish(path, store, ids)
    }

    /// Resolve the device store for `identity`.
    ///
    /// Order: the stable id itself; the address that stable id was last seen
    /// on; the address itself; the stable id last seen on the address.
    pub fn lookup(&self, identity: &DeviceIdentity) -> Option<Arc<SettingsStore>> {
        let table = self.table.lock();

        if let Some(ref id) = identity.stable_id {
            if let Some(store) = table.store_for(id) {
                return Some(store);
            }
            if let Some(store) = table.id_to_address.get(id).and_then(|a| table.store_for(a)) {
                return Some(store);
            }
        }

        if let Some(ref addr) = identity.address {
            if let Some(store) = table.store_for(addr) {
                return Some(store);
            }
            if let Some(store) = table.address_to_id.get(addr).and_then(|id| table.store_for(id)) {
                return Some(store);
            }
        }

        None
    }

    /// Resolve the device store for a single identifier (stable id or address).
    pub fn lookup_id(&self, id: &str) -> Option<Arc<SettingsStore>> {
        self.table.lock().store_for(id)
    }

    /// Record that `stable_id` was observed on `address`.
    ///
    /// One address links to at most one stable id. If a different id was
    /// previously linked (DHCP reuse, or several devices behind one NAT), the
    /// link is overwritten and a warning logged.
    pub fn cross_reference(&self, stable_id: &str, address: &str) {
        let mut table = self.table.lock();

        match table.address_to_id.insert(address.to_string(), stable_id.to_string()) {
            Some(previous) if previous != stable_id => {
                tracing::warn!(
                    address,
                    previous = %previous,
                    current = stable_id,
                    "Address now belongs to a different device id; overwriting cross-reference"
                );
                if table.id_to_address.get(&previous).is_some_and(|a| a == address) {
                    table.id_to_address.remove(&previous);
                }
            }
            Some(_) => {}
            None => {
                tracing::debug!(address, device = stable_id, "Cross-referenced device");
            }
        }

        if let Some(old_addr) = table.id_to_address.insert(stable_id.to_string(), address.to_string()) {
            if old_addr != address {
                tracing::debug!(device = stable_id, from = %old_addr, to = address, "Device changed address");
                if table.address_to_id.get(&old_addr).is_some_and(|id| id == stable_id) {
                    table.address_to_id.remove(&old_addr);
                }
            }
        }
    }

    /// The stable id last seen on `address`.
    pub fn stable_id_for(&self, address: &str) -> Option<String> {
        self.table.lock().address_to_id.get(address).cloned()
    }

    /// The address `stable_id` was last seen on.
    pub fn address_for(&self, stable_id: &str) -> Option<String> {
        self.table.lock().id_to_address.get(stable_id).cloned()
    }

    /// Forget the stores registered under both names of `identity`.
    pub fn remove(&self, identity: &DeviceIdentity) {
        let mut table = self.table.lock();
        for key in identity.keys() {
            if let Some(entry) = table.by_id.remove(key) {
                if let Some(ids) = table.files.get_mut(&entry.file) {
                    ids.remove(key);
                    if ids.is_empty() {
                        table.files.remove(&entry.file);
                    }
                }
                tracing::debug!(device = key, "Removed device registration");
            }
        }
    }

    /// The file registered for `id`.
    pub fn file_for(&self, id: &str) -> Option<PathBuf> {
        self.table.lock().by_id.get(id).map(|e| e.file.clone())
    }

    /// The identifiers registered from `path`.
    pub fn aliases(&self, path: &Path) -> BTreeSet<String> {
        self.table.lock().files.get(path).cloned().unwrap_or_default()
    }

    /// Every registered identifier, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.table.lock().by_id.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.table.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().by_id.is_empty()
    }
}

fn load_device_file(path: &Path) -> Result<(Arc<SettingsStore>, BTreeSet<String>)> {
    let store = SettingsStore::load(path)?;
    let ids = device_file::declared_ids(&store).into_iter().collect();
    Ok((Arc::new(store), ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn load_all_registers_each_declared_id() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tv.conf", "device = uuid:1234, uuid:1235\ntranscode.quality = high\n");
        write(dir.path(), "console.conf", "device = 10.0.0.9\n");
        write(dir.path(), "notes.txt", "device = uuid:ignored\n");

        let registry = DeviceRegistry::default();
        let summary = registry.load_all(dir.path()).unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.ids, 3);
        assert_eq!(registry.ids(), vec!["10.0.0.9", "uuid:1234", "uuid:1235"]);
    }

    #[test]
    fn aliases_share_one_store() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tv.conf", "device = uuid:a, uuid:b\n");
        let registry = DeviceRegistry::default();
        registry.load_all(dir.path()).unwrap();

        let a = registry.lookup_id("uuid:a").unwrap();
        let b = registry.lookup_id("uuid:b").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn skips_broken_and_undeclared_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.conf", "this line has no equals sign\n");
        write(dir.path(), "anon.conf", "transcode.quality = high\n");
        write(dir.path(), "good.conf", "device = uuid:ok\n");

        let registry = DeviceRegistry::default();
        let summary = registry.load_all(dir.path()).unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.skipped.len(), 2);
    }

    #[test]
    fn unreadable_dir_is_error() {
        let registry = DeviceRegistry::default();
        assert!(registry.load_all(Path::new("/nonexistent/devices")).is_err());
    }

    #[test]
    fn stable_id_lookup_beats_address() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "by-id.conf", "device = uuid:1\nname = by-id\n");
        write(dir.path(), "by-addr.conf", "device = 10.0.0.1\nname = by-addr\n");
        let registry = DeviceRegistry::default();
        registry.load_all(dir.path()).unwrap();

        let identity = DeviceIdentity::new("uuid:1", "10.0.0.1");
        let store = registry.lookup(&identity).unwrap();
        assert_eq!(store.get_string("name", ""), "by-id");

        let addr_only = DeviceIdentity::from_address("10.0.0.1");
        assert_eq!(registry.lookup(&addr_only).unwrap().get_string("name", ""), "by-addr");
    }

    #[test]
    fn cross_reference_lets_address_find_id_store() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tv.conf", "device = uuid:1234\n");
        let registry = DeviceRegistry::default();
        registry.load_all(dir.path()).unwrap();

        let placeholder = DeviceIdentity::from_address("10.0.0.5");
        assert!(registry.lookup(&placeholder).is_none());

        registry.cross_reference("uuid:1234", "10.0.0.5");
        let by_addr = registry.lookup(&placeholder).unwrap();
        let by_id = registry.lookup(&DeviceIdentity::from_stable_id("uuid:1234")).unwrap();
        assert!(Arc::ptr_eq(&by_addr, &by_id));
    }

    #[test]
    fn cross_reference_lets_id_find_address_store() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "console.conf", "device = 10.0.0.5\n");
        let registry = DeviceRegistry::default();
        registry.load_all(dir.path()).unwrap();

        registry.cross_reference("uuid:77", "10.0.0.5");
        let by_id = registry.lookup(&DeviceIdentity::from_stable_id("uuid:77")).unwrap();
        let by_addr = registry.lookup_id("10.0.0.5").unwrap();
        assert!(Arc::ptr_eq(&by_id, &by_addr));
    }

    #[test]
    fn cross_reference_is_last_write_wins() {
        let registry = DeviceRegistry::default();
        registry.cross_reference("uuid:old", "10.0.0.5");
        registry.cross_reference("uuid:new", "10.0.0.5");
        assert_eq!(registry.stable_id_for("10.0.0.5").as_deref(), Some("uuid:new"));
        assert!(registry.address_for("uuid:old").is_none());
    }

    #[test]
    fn roaming_device_moves_its_link() {
        let registry = DeviceRegistry::default();
        registry.cross_reference("uuid:1", "10.0.0.5");
        registry.cross_reference("uuid:1", "10.0.0.6");
        assert_eq!(registry.address_for("uuid:1").as_deref(), Some("10.0.0.6"));
        assert!(registry.stable_id_for("10.0.0.5").is_none());
    }

    #[test]
    fn load_file_drops_ids_no_longer_declared() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "tv.conf", "device = uuid:a, uuid:b\n");
        let registry = DeviceRegistry::default();
        registry.load_all(dir.path()).unwrap();

        std::fs::write(&path, "device = uuid:b, uuid:c\n").unwrap();
        let change = registry.load_file(&path).unwrap();
        assert_eq!(change.removed, BTreeSet::from(["uuid:a".to_string()]));
        assert_eq!(
            change.affected(),
            BTreeSet::from(["uuid:a".to_string(), "uuid:b".to_string(), "uuid:c".to_string()])
        );
        assert!(registry.lookup_id("uuid:a").is_none());
        assert!(registry.lookup_id("uuid:c").is_some());
    }

    #[test]
    fn failed_reload_keeps_previous_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "tv.conf", "device = uuid:a\nquality = high\n");
        let registry = DeviceRegistry::default();
        registry.load_all(dir.path()).unwrap();

        std::fs::write(&path, "device = uuid:a\nquality high\n").unwrap();
        assert!(registry.load_file(&path).is_err());
        assert_eq!(registry.lookup_id("uuid:a").unwrap().get_string("quality", ""), "high");
    }

    #[test]
    fn remove_file_and_remove_identity() {
        let dir = tempfile::tempdir().unwrap();
        let tv = write(dir.path(), "tv.conf", "device = uuid:a, uuid:b\n");
        write(dir.path(), "box.conf", "device = uuid:c\n");
        let registry = DeviceRegistry::default();
        registry.load_all(dir.path()).unwrap();

        let change = registry.remove_file(&tv);
        assert_eq!(change.removed.len(), 2);
        assert!(registry.lookup_id("uuid:a").is_none());

        registry.remove(&DeviceIdentity::from_stable_id("uuid:c"));
        assert!(registry.is_empty());
    }

    #[test]
    fn rescan_keeps_cross_references() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tv.conf", "device = uuid:1\n");
        let registry = DeviceRegistry::default();
        registry.load_all(dir.path()).unwrap();
        registry.cross_reference("uuid:1", "10.0.0.2");
        registry.load_all(dir.path()).unwrap();
        assert!(registry.lookup(&DeviceIdentity::from_address("10.0.0.2")).is_some());
    }
}
