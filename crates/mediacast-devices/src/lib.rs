//! # mediacast-devices
//!
//! Per-device configuration for connected playback clients.
//!
//! - [`DeviceRegistry`] -- maps stable ids and network addresses to the
//!   device-specific [`SettingsStore`](mediacast_settings::SettingsStore)
//!   loaded from the device directory, with address/id cross-referencing.
//! - [`RendererModels`] -- the catalog of renderer-model profiles.
//! - [`ProfileInstance`] -- the live, rebuildable cascade bound to one client.
//! - [`ConnectedProfiles`] -- live instances by address; the entry point for
//!   "device seen" and "device identified" events.
//! - [`DeviceWatcher`] -- reloads device files as they change on disk.

pub mod connected;
pub mod device_file;
pub mod models;
pub mod profile;
pub mod registry;
pub mod watcher;

pub use connected::ConnectedProfiles;
pub use models::{RendererModel, RendererModels};
pub use profile::{ProfileContext, ProfileInstance, ProfileSnapshot, ProfileState, TranscodeSession};
pub use registry::{DeviceRegistry, FileChange, LoadSummary};
pub use watcher::{DeviceWatcher, ReloadHandler};
