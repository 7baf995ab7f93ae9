//! Device settings files: identifier declarations and new-file templates.

use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;

use mediacast_common::{Error, Result};
use mediacast_settings::value::split_list;
use mediacast_settings::SettingsStore;

/// Key listing the identifiers a device file applies to.
pub const DEVICE_ID_KEY: &str = "device";

/// Older spelling of [`DEVICE_ID_KEY`], still honored.
pub const LEGACY_DEVICE_ID_KEY: &str = "Device";

/// The identifiers (stable ids or raw addresses) a device file declares.
pub fn declared_ids(store: &SettingsStore) -> Vec<String> {
    let raw = store
        .raw(DEVICE_ID_KEY)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| store.raw(LEGACY_DEVICE_ID_KEY))
        .unwrap_or_default();
    split_list(&raw)
        .into_iter()
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Whether `path` carries the recognized settings extension (case-insensitive).
pub fn has_extension(path: &Path, extension: &str) -> bool {
    let wanted = extension.trim_start_matches('.');
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(wanted))
}

/// Header and identifier lines for a fresh device file.
pub fn device_file_lines(id: &str, name: &str) -> Vec<String> {
    vec![
        "#----------------------------------------------------------------------------".into(),
        "# Custom device profile".into(),
        "# Options in this file override the renderer and global settings for the".into(),
        format!("# specific {name} device(s) listed below."),
        "# Specify devices by uuid (or address if no uuid), separated by commas if more than one.".into(),
        "#----------------------------------------------------------------------------".into(),
        String::new(),
        format!("{DEVICE_ID_KEY} = {id}"),
    ]
}

/// A file name derived from a display name, safe on every platform.
pub fn file_name_for(name: &str, extension: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    let stem = if stem.is_empty() { "device" } else { stem };
    format!("{stem}.{}", extension.trim_start_matches('.'))
}

/// Write a new device file for `id` into `dir`. Refuses to overwrite.
pub fn create_device_file(dir: &Path, id: &str, name: &str, extension: &str) -> Result<PathBuf> {
    if id.trim().is_empty() {
        return Err(Error::Validation("device id cannot be blank".into()));
    }
    let path = dir.join(file_name_for(name, extension));
    let mut text = device_file_lines(id.trim(), name).join("\n");
    text.push('\n');

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::config_io(dir, e))?;
    tmp.write_all(text.as_bytes())
        .map_err(|e| Error::config_io(&path, e))?;
    tmp.persist_noclobber(&path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            Error::Validation(format!("device file {} already exists", path.display()))
        } else {
            Error::config_io(&path, e.error)
        }
    })?;

    tracing::info!(device = id, path = %path.display(), "Created device file");
    Ok(path)
}
