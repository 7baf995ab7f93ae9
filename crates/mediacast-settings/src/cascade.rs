//! The [`Cascade`]: first-match-wins lookup over an ordered stack of stores.
//!
//! Index 0 is the most specific layer (a device profile) and the only one
//! writes go to; the last index holds global defaults. The production shape
//! is device, renderer model, global.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use mediacast_common::{Error, Result};

use crate::store::SettingsStore;
use crate::value::{FromSetting, SettingValue};

/// An ordered stack of settings stores.
#[derive(Debug)]
pub struct Cascade {
    layers: Vec<Arc<SettingsStore>>,
    overrides: Option<OverrideLog>,
}

impl Cascade {
    /// Build a cascade, most specific layer first.
    pub fn new(layers: Vec<Arc<SettingsStore>>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::EmptyCascade);
        }
        Ok(Self {
            layers,
            overrides: None,
        })
    }

    /// The production shape: device, renderer model, global.
    pub fn three_layer(device: Arc<SettingsStore>, reference: Arc<SettingsStore>, global: Arc<SettingsStore>) -> Self {
        Self {
            layers: vec![device, reference, global],
            overrides: None,
        }
    }

    /// Log resolved values that differ from their defaults (see [`OverrideLog`]).
    pub fn with_override_logging(mut self) -> Self {
        self.overrides = Some(OverrideLog::default());
        self
    }

    pub fn layers(&self) -> &[Arc<SettingsStore>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The innermost (index 0) layer.
    pub fn innermost(&self) -> &Arc<SettingsStore> {
        &self.layers[0]
    }

    /// Index of the first layer that defines `key`.
    pub fn defining_layer(&self, key: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.contains_key(key))
    }

    /// The persisted string from the first defining layer.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|l| l.raw(key))
    }

    /// Typed lookup. The first layer defining `key` decides; if its value is
    /// blank or unconvertible the result is `default`, without consulting
    /// outer layers.
    pub fn resolve<T: FromSetting>(&self, key: &str, default: T) -> T {
        let found = self
            .layers
            .iter()
            .enumerate()
            .find_map(|(idx, layer)| layer.raw(key).map(|raw| (idx, raw)));

        let (value, layer) = match found {
            Some((idx, raw)) => match T::from_setting(&raw) {
                Some(v) => (v, Some(idx)),
                None => (default, None),
            },
            None => (default, None),
        };

        if let Some(ref log) = self.overrides {
            log.observe(key, &value, layer.filter(|&i| i == 0).and(self.layers[0].tag()));
        }
        value
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.resolve(key, default.to_string())
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.resolve(key, default)
    }

    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.resolve(key, default)
    }

    pub fn get_double(&self, key: &str, default: f64) -> f64 {
        self.resolve(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.resolve(key, default)
    }

    pub fn get_string_list(&self, key: &str, default: &[&str]) -> Vec<String> {
        self.resolve(key, default.iter().map(|s| s.to_string()).collect())
    }

    /// Write to the innermost layer.
    pub fn write(&self, key: &str, value: impl Into<SettingValue>) -> Result<()> {
        let target = self.innermost();
        if !target.is_writable() {
            return Err(Error::ReadOnlyTarget);
        }
        target.set(key, value)
    }
}

/// Records the last value logged per key, emitting a `debug` line the first
/// time a key is read and whenever its resolved value changes.
#[derive(Debug, Default)]
pub struct OverrideLog {
    seen: Mutex<HashMap<String, String>>,
}

impl OverrideLog {
    fn observe<T: std::fmt::Debug>(&self, key: &str, value: &T, source: Option<String>) {
        let rendered = format!("{value:?}");
        let mut seen = self.seen.lock();
        let previous = seen.insert(key.to_string(), rendered.clone());
        if previous.as_deref() == Some(rendered.as_str()) {
            return;
        }
        let src = source.map(|s| format!("{s} ")).unwrap_or_default();
        match previous {
            None => tracing::debug!("{src}Reading {key}: {rendered}"),
            Some(prev) => tracing::debug!("{src}Reading {key}: {rendered} (previous: {prev})"),
        }
    }

    /// Number of distinct keys observed.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
