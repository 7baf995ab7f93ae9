//! mediacast-common: shared error type, device identities, and configuration.
//!
//! This crate is the foundational dependency for the other mediacast crates.
//! It provides the unified [`Error`] type, the [`DeviceIdentity`] pair used to
//! name connected clients, and the application [`Config`].

pub mod config;
pub mod error;
pub mod ids;

pub use config::Config;
pub use error::{Error, Result};
pub use ids::DeviceIdentity;
