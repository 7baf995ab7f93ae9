//! Renderer-model profiles: the middle cascade layer.
//!
//! A renderer-model file describes a family of devices (a TV series, a
//! console) and names itself with `RendererName`. When several models
//! recognize one client, the higher `LoadingPriority` wins.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use mediacast_common::{Error, Result};
use mediacast_settings::SettingsStore;

use crate::device_file;

pub const RENDERER_NAME_KEY: &str = "RendererName";
pub const LOADING_PRIORITY_KEY: &str = "LoadingPriority";

/// A named, read-only renderer-model store.
#[derive(Debug, Clone)]
pub struct RendererModel {
    pub name: String,
    pub priority: i32,
    pub store: Arc<SettingsStore>,
}

impl RendererModel {
    /// Wrap a loaded store, taking the name from `RendererName` or `fallback_name`.
    pub fn from_store(store: SettingsStore, fallback_name: &str) -> Self {
        let name = store.get_string(RENDERER_NAME_KEY, fallback_name);
        let priority = store.get_int(LOADING_PRIORITY_KEY, 0);
        Self {
            name,
            priority,
            store: Arc::new(store.into_read_only()),
        }
    }

    /// Load a model file.
    pub fn load(path: &Path) -> Result<Self> {
        let store = SettingsStore::load(path)?;
        let fallback = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown renderer".into());
        Ok(Self::from_store(store, &fallback))
    }

    /// Whether this model should replace `current` on an already-bound profile.
    pub fn outranks(&self, current: Option<&RendererModel>) -> bool {
        match current {
            None => true,
            Some(cur) => self.priority > cur.priority,
        }
    }
}

/// The catalog of known renderer models, keyed by name.
#[derive(Debug, Default)]
pub struct RendererModels {
    models: RwLock<IndexMap<String, RendererModel>>,
}

impl RendererModels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every model file in `dir`. Broken files are logged and skipped.
    pub fn load_dir(&self, dir: &Path, extension: &str) -> Result<usize> {
        let reader = std::fs::read_dir(dir).map_err(|e| Error::config_io(dir, e))?;
        let mut paths: Vec<_> = reader
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && device_file::has_extension(p, extension))
            .collect();
        paths.sort();

        let mut loaded = IndexMap::new();
        for path in paths {
            match RendererModel::load(&path) {
                Ok(model) => {
                    tracing::debug!(name = %model.name, priority = model.priority, "Loaded renderer model");
                    loaded.insert(model.name.clone(), model);
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to load renderer model"),
            }
        }

        let count = loaded.len();
        *self.models.write() = loaded;
        tracing::info!(dir = %dir.display(), count, "Loaded renderer models");
        Ok(count)
    }

    pub fn insert(&self, model: RendererModel) {
        self.models.write().insert(model.name.clone(), model);
    }

    pub fn get(&self, name: &str) -> Option<RendererModel> {
        self.models.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.models.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}
