//! Shared test harness for integration tests.
//!
//! [`TestHarness`] lays out a temporary profile tree (device directory,
//! renderer-model directory, global settings, rule file) and builds a
//! [`MediaCast`] over it with the watcher disabled.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use mediacast::common::Config;
use mediacast::MediaCast;
use tempfile::TempDir;

pub struct TestHarness {
    pub dir: TempDir,
    pub app: MediaCast,
}

impl TestHarness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn device_dir(&self) -> PathBuf {
        self.dir.path().join("devices")
    }

    /// Write (or overwrite) a device file and apply it as the watcher would.
    pub fn write_device(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.device_dir().join(name);
        std::fs::write(&path, contents).unwrap();
        self.app.reload_device_file(&path);
        path
    }
}

#[derive(Default)]
pub struct HarnessBuilder {
    devices: Vec<(String, String)>,
    models: Vec<(String, String)>,
    global: Option<String>,
    rules: Option<String>,
}

impl HarnessBuilder {
    pub fn device(mut self, name: &str, contents: &str) -> Self {
        self.devices.push((name.into(), contents.into()));
        self
    }

    pub fn model(mut self, name: &str, contents: &str) -> Self {
        self.models.push((name.into(), contents.into()));
        self
    }

    pub fn global(mut self, contents: &str) -> Self {
        self.global = Some(contents.into());
        self
    }

    pub fn rules(mut self, contents: &str) -> Self {
        self.rules = Some(contents.into());
        self
    }

    pub fn build(self) -> TestHarness {
        let dir = tempfile::tempdir().unwrap();
        let config = write_tree(dir.path(), &self);
        TestHarness {
            app: MediaCast::from_config(config),
            dir,
        }
    }
}

fn write_tree(root: &Path, builder: &HarnessBuilder) -> Config {
    let devices = root.join("devices");
    let renderers = root.join("renderers");
    std::fs::create_dir_all(&devices).unwrap();
    std::fs::create_dir_all(&renderers).unwrap();

    for (name, text) in &builder.devices {
        std::fs::write(devices.join(name), text).unwrap();
    }
    for (name, text) in &builder.models {
        std::fs::write(renderers.join(name), text).unwrap();
    }

    let mut config = Config::default();
    config.profiles.device_dir = devices;
    config.profiles.renderer_dir = Some(renderers);
    config.watch.enabled = false;

    if let Some(ref text) = builder.global {
        let path = root.join("global.conf");
        std::fs::write(&path, text).unwrap();
        config.profiles.global_settings = Some(path);
    }
    if let Some(ref text) = builder.rules {
        let path = root.join("ffmpeg.webfilters");
        std::fs::write(&path, text).unwrap();
        config.filters.rules_file = Some(path);
    }
    config
}
