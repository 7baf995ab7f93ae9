//! # mediacast-webfilters
//!
//! Rules that classify and rewrite remote media URLs before they are handed
//! to the transcoder.
//!
//! - [`PatternMap`] -- an ordered set of regex-keyed rules matched through
//!   one combined alternation, recompiled lazily after edits.
//! - [`WebFilters`] -- the three rule categories (`EXCLUDE`, `OPTIONS`,
//!   `REPLACE`) and the rule-file loader.
//! - [`parse_options`] -- shell-style tokenizer for `OPTIONS` payloads.

pub mod options;
pub mod pattern_map;
pub mod rules;
pub mod template;

pub use options::parse_options;
pub use pattern_map::PatternMap;
pub use rules::{CategoryReport, LoadReport, WebFilters};
pub use template::Replacement;
