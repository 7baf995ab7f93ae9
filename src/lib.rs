//! mediacast - device-aware settings resolution and URL filtering for a
//! media streaming server.
//!
//! This library crate wires the member crates together behind [`MediaCast`]
//! and re-exports them for integration testing.

pub mod app;

pub use app::{MediaCast, StartupReport};

pub use mediacast_common as common;
pub use mediacast_devices as devices;
pub use mediacast_settings as settings;
pub use mediacast_webfilters as webfilters;
