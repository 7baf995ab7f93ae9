//! # mediacast-settings
//!
//! Typed key/value settings and the layered lookup built on top of them.
//!
//! - [`SettingsStore`] -- an ordered property list persisted as `key = value`
//!   lines, with type-coerced, blank-aware accessors.
//! - [`Cascade`] -- an ordered stack of stores where the most specific layer
//!   that defines a key wins and writes go to the innermost layer.
//! - [`FromSetting`] / [`SettingValue`] -- conversions between raw strings and
//!   typed values.

pub mod cascade;
pub mod store;
pub mod value;

pub use cascade::Cascade;
pub use store::SettingsStore;
pub use value::{FromSetting, SettingValue, EMPTY_LIST};
