//! The [`SettingsStore`]: an ordered `key = value` property list.
//!
//! Files are plain text, one `key = value` per line, with `#` or `!` comment
//! lines and blank lines ignored. Values are trimmed. A doubled backslash in
//! the file reads back as a single one, and saving doubles every backslash,
//! so Windows paths and regular expressions round-trip unchanged.

use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use parking_lot::RwLock;

use mediacast_common::{Error, Result};

use crate::value::{FromSetting, SettingValue};

/// An ordered key/value store, optionally backed by a file.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    writable: bool,
    /// Leading comment block, re-emitted on save.
    header: Vec<String>,
    props: RwLock<IndexMap<String, String>>,
}

impl SettingsStore {
    /// An empty, writable, in-memory store.
    pub fn empty() -> Self {
        Self {
            path: None,
            writable: true,
            header: Vec::new(),
            props: RwLock::new(IndexMap::new()),
        }
    }

    /// Build an in-memory store from `key = value` text.
    pub fn from_text(text: &str) -> Result<Self> {
        let (header, props) = parse(text, Path::new("<memory>"))?;
        Ok(Self {
            path: None,
            writable: true,
            header,
            props: RwLock::new(props),
        })
    }

    /// Load a writable store from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::config_io(path, e))?;
        let (header, props) = parse(&text, path)?;
        tracing::trace!(path = %path.display(), keys = props.len(), "Loaded settings");
        Ok(Self {
            path: Some(path.to_path_buf()),
            writable: true,
            header,
            props: RwLock::new(props),
        })
    }

    /// Load a store whose setters fail with [`Error::ReadOnlyTarget`].
    pub fn load_read_only(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::load(path)?.into_read_only())
    }

    /// Consume this store and return a read-only copy.
    pub fn into_read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// The backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether this store was loaded from a real file.
    pub fn is_file_backed(&self) -> bool {
        self.path.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Short tag used in log lines, e.g. `[LivingRoomTV.conf]`.
    pub fn tag(&self) -> Option<String> {
        self.path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| format!("[{}]", n.to_string_lossy()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.props.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.props.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.read().is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.props.read().keys().cloned().collect()
    }

    /// The persisted string for `key`, if present.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.props.read().get(key).cloned()
    }

    /// A copy of every entry in order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.props
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Typed lookup: the coerced value, or `default` when absent, blank, or unconvertible.
    pub fn get<T: FromSetting>(&self, key: &str, default: T) -> T {
        self.props
            .read()
            .get(key)
            .and_then(|raw| T::from_setting(raw))
            .unwrap_or(default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key, default.to_string())
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.get(key, default)
    }

    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.get(key, default)
    }

    pub fn get_double(&self, key: &str, default: f64) -> f64 {
        self.get(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key, default)
    }

    pub fn get_string_list(&self, key: &str, default: &[&str]) -> Vec<String> {
        self.get(key, default.iter().map(|s| s.to_string()).collect())
    }

    /// Set `key`, appending it if new and replacing in place otherwise.
    pub fn set(&self, key: &str, value: impl Into<SettingValue>) -> Result<()> {
        if !self.writable {
            return Err(Error::ReadOnlyTarget);
        }
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Validation("setting key cannot be blank".into()));
        }
        let persisted = value.into().to_persisted();
        self.props.write().insert(key.to_string(), persisted);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<Option<String>> {
        if !self.writable {
            return Err(Error::ReadOnlyTarget);
        }
        Ok(self.props.write().shift_remove(key))
    }

    /// Save back to the file this store was loaded from.
    pub fn save(&self) -> Result<()> {
        match self.path {
            Some(ref path) => self.save_to(path),
            None => Err(Error::Validation(
                "in-memory settings store has no backing file".into(),
            )),
        }
    }

    /// Write the store to `path` via a sibling temp file and an atomic rename,
    /// so a failed write leaves the previous file intact.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let rendered = self.render();
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::config_io(path, e))?;
        tmp.write_all(rendered.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Error::config_io(path, e))?;
        tmp.persist(path)
            .map_err(|e| Error::config_io(path, e.error))?;

        tracing::debug!(path = %path.display(), "Saved settings");
        Ok(())
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.header {
            out.push_str(line);
            out.push('\n');
        }
        if !self.header.is_empty() {
            out.push('\n');
        }
        for (key, value) in self.props.read().iter() {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(&value.replace('\\', "\\\\"));
            out.push('\n');
        }
        out
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::empty()
    }
}

/// Parse `key = value` text into the leading comment block and the ordered entries.
fn parse(text: &str, source: &Path) -> Result<(Vec<String>, IndexMap<String, String>)> {
    let mut header = Vec::new();
    let mut props = IndexMap::new();
    let mut in_header = true;

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#') || trimmed.starts_with('!') {
            if in_header {
                header.push(trimmed.to_string());
            }
            continue;
        }
        in_header = false;

        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(Error::parse(source, idx + 1, format!("expected 'key = value', got '{trimmed}'")));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::parse(source, idx + 1, "empty key"));
        }
        let value = value.trim().replace("\\\\", "\\");
        if props.insert(key.to_string(), value).is_some() {
            tracing::debug!(key, file = %source.display(), "Duplicate setting; last value wins");
        }
    }

    Ok((header, props))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_and_blank_lines() {
        let store = SettingsStore::from_text(
            "# Custom device profile\n\n! legacy comment\ndevice = uuid:1234\n  transcode.quality=high  \n",
        )
        .unwrap();
        assert_eq!(store.keys(), vec!["device", "transcode.quality"]);
        assert_eq!(store.get_string("transcode.quality", "low"), "high");
    }

    #[test]
    fn missing_equals_is_parse_error() {
        let err = SettingsStore::from_text("device = a\njust some words\n").unwrap_err();
        match err {
            Error::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn blank_value_uses_default() {
        let store = SettingsStore::from_text("name =   \ncount = \n").unwrap();
        assert_eq!(store.get_string("name", "fallback"), "fallback");
        assert_eq!(store.get_int("count", 3), 3);
        assert!(store.contains_key("name"));
    }

    #[test]
    fn absent_key_uses_default() {
        let store = SettingsStore::empty();
        assert_eq!(store.get_long("missing", 7), 7);
        assert!(store.get_bool("missing", true));
        assert_eq!(store.get_string_list("missing", &["a"]), vec!["a"]);
    }

    #[test]
    fn escaped_backslashes_collapse_on_load() {
        let store = SettingsStore::from_text("path = C:\\\\Media\\\\Movies\nregex = \\.mkv$\n").unwrap();
        assert_eq!(store.raw("path").unwrap(), "C:\\Media\\Movies");
        assert_eq!(store.raw("regex").unwrap(), "\\.mkv$");
    }

    #[test]
    fn backslashes_round_trip_through_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tv.conf");
        let store = SettingsStore::empty();
        store.set("path", "C:\\Media\\Movies").unwrap();
        store.set("pattern", "\\\\server\\share").unwrap();
        store.save_to(&path).unwrap();

        let reloaded = SettingsStore::load(&path).unwrap();
        assert_eq!(reloaded.raw("path").unwrap(), "C:\\Media\\Movies");
        assert_eq!(reloaded.raw("pattern").unwrap(), "\\\\server\\share");
    }

    #[test]
    fn empty_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lists.conf");
        let store = SettingsStore::empty();
        store.set("codecs", Vec::<String>::new()).unwrap();
        store.set("containers", vec!["mkv".to_string(), "mp4".to_string()]).unwrap();
        store.save_to(&path).unwrap();

        let reloaded = SettingsStore::load(&path).unwrap();
        assert!(reloaded.get_string_list("codecs", &["x"]).is_empty());
        assert_eq!(reloaded.get_string_list("containers", &[]), vec!["mkv", "mp4"]);
    }

    #[test]
    fn set_replaces_in_place() {
        let store = SettingsStore::from_text("a = 1\nb = 2\n").unwrap();
        store.set("a", 10).unwrap();
        store.set("c", true).unwrap();
        assert_eq!(store.keys(), vec!["a", "b", "c"]);
        assert_eq!(store.get_int("a", 0), 10);
        assert!(store.get_bool("c", false));
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("global.conf");
        std::fs::write(&path, "a = 1\n").unwrap();
        let store = SettingsStore::load_read_only(&path).unwrap();
        assert!(matches!(store.set("a", 2), Err(Error::ReadOnlyTarget)));
        assert!(matches!(store.remove("a"), Err(Error::ReadOnlyTarget)));
        assert_eq!(store.get_int("a", 0), 1);
    }

    #[test]
    fn unreadable_file_is_config_io_error() {
        let err = SettingsStore::load("/nonexistent/dir/device.conf").unwrap_err();
        assert!(matches!(err, Error::ConfigIo { .. }));
    }

    #[test]
    fn save_keeps_header_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tv.conf");
        std::fs::write(&path, "# Living room TV\ndevice = uuid:1\n").unwrap();
        let store = SettingsStore::load(&path).unwrap();
        store.set("transcode.quality", "high").unwrap();
        store.save().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Living room TV\n"));
        assert!(text.contains("transcode.quality = high"));
    }

    #[test]
    fn failed_save_leaves_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("tv.conf");
        let store = SettingsStore::empty();
        store.set("a", 1).unwrap();
        assert!(matches!(store.save_to(&path), Err(Error::ConfigIo { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn save_without_path_fails() {
        assert!(SettingsStore::empty().save().is_err());
    }

    #[test]
    fn tag_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LivingRoom.conf");
        std::fs::write(&path, "a = 1\n").unwrap();
        let store = SettingsStore::load(&path).unwrap();
        assert_eq!(store.tag().as_deref(), Some("[LivingRoom.conf]"));
        assert!(SettingsStore::empty().tag().is_none());
    }
}
