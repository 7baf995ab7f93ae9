//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! profile, watcher, and filter sections. Every section defaults sensibly so
//! an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// Locations searched when no config path is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./mediacast.toml",
    "~/.config/mediacast/config.toml",
    "/etc/mediacast/config.toml",
];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub profiles: ProfilesConfig,
    pub watch: WatchConfig,
    pub filters: FiltersConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(toml_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))?;
        config.expand_paths();
        Ok(config)
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// file is missing or broken. With no path, the default locations are tried.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(find_default_config) else {
            tracing::info!("No config file found; using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.profiles.device_dir.is_dir() {
            warnings.push(format!(
                "profiles.device_dir {} is not a directory; no device profiles will load",
                self.profiles.device_dir.display()
            ));
        }

        if let Some(ref dir) = self.profiles.renderer_dir {
            if !dir.is_dir() {
                warnings.push(format!(
                    "profiles.renderer_dir {} is not a directory",
                    dir.display()
                ));
            }
        }

        if let Some(ref global) = self.profiles.global_settings {
            if !global.is_file() {
                warnings.push(format!(
                    "profiles.global_settings {} does not exist; global defaults are empty",
                    global.display()
                ));
            }
        }

        let ext = self.profiles.extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\']) {
            warnings.push(format!(
                "profiles.extension '{}' is not a usable file extension",
                self.profiles.extension
            ));
        }

        if self.watch.enabled && self.watch.debounce_ms == 0 {
            warnings.push("watch.debounce_ms is 0; every raw event triggers a reload".into());
        }

        if let Some(ref rules) = self.filters.rules_file {
            if !rules.is_file() {
                warnings.push(format!(
                    "filters.rules_file {} does not exist; URL filtering is disabled",
                    rules.display()
                ));
            }
        }

        warnings
    }

    fn expand_paths(&mut self) {
        self.profiles.device_dir = expand(&self.profiles.device_dir);
        self.profiles.renderer_dir = self.profiles.renderer_dir.as_deref().map(expand);
        self.profiles.global_settings = self.profiles.global_settings.as_deref().map(expand);
        self.filters.rules_file = self.filters.rules_file.as_deref().map(expand);
    }
}

fn find_default_config() -> Option<PathBuf> {
    DEFAULT_CONFIG_PATHS
        .iter()
        .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
        .find(|p| p.exists())
}

fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Where device, renderer-model, and global settings live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    /// Directory of per-device settings files.
    pub device_dir: PathBuf,
    /// Directory of renderer-model settings files.
    pub renderer_dir: Option<PathBuf>,
    /// Global defaults file (the outermost cascade layer).
    pub global_settings: Option<PathBuf>,
    /// Recognized settings file extension, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Log every cascaded value that overrides its default.
    pub log_overrides: bool,
}

fn default_extension() -> String {
    "conf".into()
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from("./profiles/devices"),
            renderer_dir: None,
            global_settings: None,
            extension: default_extension(),
            log_overrides: false,
        }
    }
}

/// Device-directory watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    /// Events for the same file inside this window are coalesced.
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

fn default_debounce() -> u64 {
    500
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce(),
        }
    }
}

/// URL rule-file settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    pub rules_file: Option<PathBuf>,
}
