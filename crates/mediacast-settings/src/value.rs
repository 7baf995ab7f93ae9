//! Conversions between persisted strings and typed setting values.

use std::fmt;

/// Persisted form of an empty list, distinct from an unset key.
pub const EMPTY_LIST: &str = "None";

/// A type that can be read out of a raw persisted string.
///
/// Returning `None` means "use the caller's default": the raw value was blank
/// or could not be converted.
pub trait FromSetting: Sized + fmt::Debug + PartialEq {
    fn from_setting(raw: &str) -> Option<Self>;
}

impl FromSetting for String {
    fn from_setting(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

impl FromSetting for i32 {
    fn from_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

impl FromSetting for i64 {
    fn from_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

impl FromSetting for f64 {
    fn from_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

impl FromSetting for bool {
    fn from_setting(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "y" | "t" | "1" => Some(true),
            "false" | "no" | "off" | "n" | "f" | "0" => Some(false),
            _ => None,
        }
    }
}

impl FromSetting for Vec<String> {
    fn from_setting(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed == EMPTY_LIST {
            return Some(Vec::new());
        }
        Some(split_list(trimmed))
    }
}

/// Split a comma-separated list, trimming items and dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A typed value being written into a store.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Text(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    List(Vec<String>),
}

impl SettingValue {
    /// Render to the persisted string form.
    pub fn to_persisted(&self) -> String {
        match self {
            SettingValue::Text(s) => s.trim().to_string(),
            SettingValue::Int(i) => i.to_string(),
            SettingValue::Double(d) => d.to_string(),
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::List(items) if items.is_empty() => EMPTY_LIST.to_string(),
            SettingValue::List(items) => items
                .iter()
                .map(|s| s.trim())
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        SettingValue::Text(s.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        SettingValue::Text(s)
    }
}

impl From<i32> for SettingValue {
    fn from(i: i32) -> Self {
        SettingValue::Int(i.into())
    }
}

impl From<i64> for SettingValue {
    fn from(i: i64) -> Self {
        SettingValue::Int(i)
    }
}

impl From<f64> for SettingValue {
    fn from(d: f64) -> Self {
        SettingValue::Double(d)
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        SettingValue::Bool(b)
    }
}

impl From<Vec<String>> for SettingValue {
    fn from(items: Vec<String>) -> Self {
        SettingValue::List(items)
    }
}

impl From<&[&str]> for SettingValue {
    fn from(items: &[&str]) -> Self {
        SettingValue::List(items.iter().map(|s| s.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_string_is_none() {
        assert_eq!(String::from_setting("   "), None);
        assert_eq!(String::from_setting("  high "), Some("high".to_string()));
    }

    #[test]
    fn numbers_fall_back_on_garbage() {
        assert_eq!(i32::from_setting(" 42 "), Some(42));
        assert_eq!(i32::from_setting("forty"), None);
        assert_eq!(i64::from_setting("5000000000"), Some(5_000_000_000));
        assert_eq!(i32::from_setting("5000000000"), None);
        assert_eq!(f64::from_setting("1.5"), Some(1.5));
    }

    #[test]
    fn bool_spellings() {
        for t in ["true", "YES", "on", "y", "T", "1"] {
            assert_eq!(bool::from_setting(t), Some(true), "{t}");
        }
        for f in ["false", "No", "OFF", "n", "f", "0"] {
            assert_eq!(bool::from_setting(f), Some(false), "{f}");
        }
        assert_eq!(bool::from_setting("maybe"), None);
    }

    #[test]
    fn list_sentinel_and_splitting() {
        assert_eq!(Vec::<String>::from_setting("None"), Some(vec![]));
        assert_eq!(Vec::<String>::from_setting(""), None);
        assert_eq!(
            Vec::<String>::from_setting("foo, bar ,baz"),
            Some(vec!["foo".into(), "bar".into(), "baz".into()])
        );
    }

    #[test]
    fn empty_list_persists_as_sentinel() {
        assert_eq!(SettingValue::List(vec![]).to_persisted(), "None");
        assert_eq!(
            SettingValue::from(vec!["a".to_string(), " b".to_string()]).to_persisted(),
            "a,b"
        );
    }
}
