//! The [`MediaCast`] composition root.
//!
//! Owns one registry, one renderer-model catalog, one connected-profile
//! table and one set of web filters, and exposes the queries the
//! connection-handling and transcoding layers call. Several independent
//! instances can coexist in one process.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mediacast_common::{Config, DeviceIdentity, Error, Result};
use mediacast_devices::{
    device_file, ConnectedProfiles, DeviceRegistry, DeviceWatcher, FileChange, LoadSummary, ProfileContext,
    ProfileInstance, ReloadHandler, RendererModel, RendererModels,
};
use mediacast_settings::{FromSetting, SettingsStore};
use mediacast_webfilters::{LoadReport, WebFilters};

/// What startup loaded, for reporting.
#[derive(Debug, Default, Clone)]
pub struct StartupReport {
    pub devices: Option<LoadSummary>,
    pub models: usize,
    pub global_keys: usize,
    pub filters: Option<LoadReport>,
    /// Recoverable problems encountered while loading.
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct MediaCast {
    config: Config,
    registry: Arc<DeviceRegistry>,
    models: Arc<RendererModels>,
    profiles: Arc<ConnectedProfiles>,
    filters: Arc<WebFilters>,
    startup: StartupReport,
}

impl MediaCast {
    /// An empty instance over `global` defaults; nothing is read from disk.
    pub fn new(config: Config, global: SettingsStore) -> Self {
        let registry = Arc::new(DeviceRegistry::new(config.profiles.extension.clone()));
        let mut ctx = ProfileContext::new(registry.clone(), Arc::new(global.into_read_only()));
        ctx.log_overrides = config.profiles.log_overrides;
        Self {
            registry,
            models: Arc::new(RendererModels::new()),
            profiles: Arc::new(ConnectedProfiles::new(Arc::new(ctx))),
            filters: Arc::new(WebFilters::new()),
            startup: StartupReport::default(),
            config,
        }
    }

    /// Build an instance and load everything `config` points at.
    ///
    /// Configuration problems degrade to defaults: each one is logged and
    /// recorded in [`startup_report`](Self::startup_report).
    pub fn from_config(config: Config) -> Self {
        let mut warnings = Vec::new();

        let global = match config.profiles.global_settings {
            Some(ref path) => SettingsStore::load(path).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Global settings unavailable; using empty defaults");
                warnings.push(e.to_string());
                SettingsStore::empty()
            }),
            None => SettingsStore::empty(),
        };
        let global_keys = global.len();

        let mut app = Self::new(config, global);

        let devices = match app.registry.load_all(&app.config.profiles.device_dir) {
            Ok(summary) => {
                warnings.extend(summary.skipped.iter().map(|p| format!("skipped device file {}", p.display())));
                Some(summary)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Device profiles unavailable");
                warnings.push(e.to_string());
                None
            }
        };

        let mut models = 0;
        if let Some(ref dir) = app.config.profiles.renderer_dir {
            match app.models.load_dir(dir, &app.config.profiles.extension) {
                Ok(n) => models = n,
                Err(e) => {
                    tracing::warn!(error = %e, "Renderer models unavailable");
                    warnings.push(e.to_string());
                }
            }
        }

        let filters = match app.config.filters.rules_file {
            Some(ref path) => match app.filters.load(path) {
                Ok(report) => {
                    warnings.extend(
                        report
                            .rejected
                            .iter()
                            .map(|r| format!("rejected {} rule on line {}: {}", r.section, r.line, r.reason)),
                    );
                    Some(report)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Web filters unavailable; URL filtering disabled");
                    warnings.push(e.to_string());
                    None
                }
            },
            None => None,
        };

        app.startup = StartupReport {
            devices,
            models,
            global_keys,
            filters,
            warnings,
        };
        app
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn startup_report(&self) -> &StartupReport {
        &self.startup
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn models(&self) -> &Arc<RendererModels> {
        &self.models
    }

    pub fn profiles(&self) -> &Arc<ConnectedProfiles> {
        &self.profiles
    }

    pub fn filters(&self) -> &Arc<WebFilters> {
        &self.filters
    }

    /// Resolve `key` for a client.
    ///
    /// A connected client answers through its live profile (which includes
    /// its renderer model). Anyone else resolves against their device file,
    /// if any, and the global defaults.
    pub fn resolve_setting<T: FromSetting>(&self, identity: &DeviceIdentity, key: &str, default: T) -> T {
        if let Some(profile) = self.find_profile(identity) {
            return profile.resolve(key, default);
        }
        let transient = ProfileInstance::new(identity.clone(), self.profiles.context().clone());
        transient.rebuild();
        transient.resolve(key, default)
    }

    fn find_profile(&self, identity: &DeviceIdentity) -> Option<Arc<ProfileInstance>> {
        identity
            .stable_id
            .as_deref()
            .and_then(|id| self.profiles.find_by_stable_id(id))
            .or_else(|| identity.address.as_deref().and_then(|a| self.profiles.find(a)))
    }

    pub fn is_excluded(&self, url: &str) -> bool {
        self.filters.is_excluded(url)
    }

    pub fn auto_options_for(&self, url: &str) -> Option<Vec<String>> {
        self.filters.auto_options_for(url)
    }

    pub fn rewrite(&self, url: &str) -> String {
        self.filters.rewrite(url)
    }

    /// Re-read the rule file. Failure keeps the current rules.
    pub fn reload_filters(&self) -> Result<LoadReport> {
        self.filters.reload()
    }

    /// The profile for a client at `address` (placeholder or existing).
    pub fn on_device_seen(&self, address: &str) -> Arc<ProfileInstance> {
        self.profiles.on_device_seen(address, None)
    }

    /// Like [`on_device_seen`](Self::on_device_seen), with the renderer model
    /// the discovery layer recognized. Unknown model names are ignored.
    pub fn on_device_seen_as(&self, address: &str, model: &str) -> Arc<ProfileInstance> {
        let found = self.models.get(model);
        if found.is_none() {
            tracing::debug!(address, model, "Unknown renderer model");
        }
        self.profiles.on_device_seen(address, found)
    }

    /// Same as [`on_device_seen`](Self::on_device_seen) but with an explicit model.
    pub fn on_device_seen_with(&self, address: &str, model: Option<RendererModel>) -> Arc<ProfileInstance> {
        self.profiles.on_device_seen(address, model)
    }

    /// The protocol layer learned `stable_id` for `profile`.
    pub fn on_device_identified(&self, profile: &Arc<ProfileInstance>, stable_id: &str) -> bool {
        self.profiles.on_device_identified(profile, stable_id)
    }

    pub fn disconnect(&self, address: &str) -> bool {
        self.profiles.disconnect(address)
    }

    pub fn reload_handler(&self) -> ReloadHandler {
        ReloadHandler::new(self.registry.clone(), self.profiles.clone())
    }

    /// Apply a change to one device file immediately, as the watcher would.
    pub fn reload_device_file(&self, path: &Path) -> Option<FileChange> {
        self.reload_handler().handle_path(path)
    }

    /// Start watching the device directory, unless disabled in config.
    pub fn start_watcher(&self) -> Result<Option<DeviceWatcher>> {
        let watch = &self.config.watch;
        if !watch.enabled {
            tracing::info!("Device watcher is disabled");
            return Ok(None);
        }
        let dir = &self.config.profiles.device_dir;
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "Device directory does not exist; not watching");
            return Ok(None);
        }
        DeviceWatcher::start(dir, Duration::from_millis(watch.debounce_ms), self.reload_handler()).map(Some)
    }

    /// Write a new device file for `id` and register it.
    pub fn create_device(&self, id: &str, name: &str) -> Result<PathBuf> {
        let dir = &self.config.profiles.device_dir;
        std::fs::create_dir_all(dir).map_err(|e| Error::config_io(dir, e))?;
        let path = device_file::create_device_file(dir, id, name, &self.config.profiles.extension)?;
        let change = self.registry.load_file(&path)?;
        self.profiles.rebuild_affected(&change);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.profiles.device_dir = dir.join("devices");
        config.watch.enabled = false;
        config
    }

    #[test]
    fn missing_directories_degrade_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.filters.rules_file = Some(dir.path().join("missing.webfilters"));

        let app = MediaCast::from_config(config);
        let report = app.startup_report();
        assert!(report.devices.is_none());
        assert!(report.filters.is_none());
        assert_eq!(report.warnings.len(), 2);
        assert!(!app.is_excluded("http://x/a.m3u8"));
        assert_eq!(app.rewrite("http://x/"), "http://x/");
    }

    #[test]
    fn resolve_setting_without_live_profile() {
        let dir = tempfile::tempdir().unwrap();
        let devices = dir.path().join("devices");
        std::fs::create_dir_all(&devices).unwrap();
        std::fs::write(devices.join("tv.conf"), "device = uuid:tv\nmax.bitrate = 9000\n").unwrap();

        let app = MediaCast::from_config(config_in(dir.path()));
        assert_eq!(app.resolve_setting(&DeviceIdentity::from_stable_id("uuid:tv"), "max.bitrate", 0), 9000);
        assert_eq!(app.resolve_setting(&DeviceIdentity::from_address("10.0.0.1"), "max.bitrate", 0), 0);
    }

    #[test]
    fn create_device_rebinds_live_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let app = MediaCast::from_config(config_in(dir.path()));
        let profile = app.on_device_seen("10.0.0.8");
        assert!(!profile.is_customized());

        let path = app.create_device("10.0.0.8", "Kitchen speaker").unwrap();
        assert!(path.ends_with("Kitchen_speaker.conf"));
        assert!(profile.is_customized());
    }

    #[test]
    fn unknown_model_name_binds_no_reference() {
        let dir = tempfile::tempdir().unwrap();
        let app = MediaCast::from_config(config_in(dir.path()));
        let profile = app.on_device_seen_as("10.0.0.8", "Nonexistent");
        assert!(profile.reference().is_none());
    }

    #[test]
    fn watcher_disabled_by_config() {
        let dir = tempfile::tempdir().unwrap();
        let app = MediaCast::from_config(config_in(dir.path()));
        assert!(app.start_watcher().unwrap().is_none());
    }
}
