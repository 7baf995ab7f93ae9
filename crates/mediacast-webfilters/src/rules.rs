//! [`WebFilters`] and the rule-file loader.
//!
//! A rule file is split into sections by the header lines `EXCLUDE`,
//! `OPTIONS` and `REPLACE`. Every other non-blank, non-`#` line inside a
//! section is `<pattern> | <payload>`:
//!
//! ```text
//! EXCLUDE
//! .*\.m3u8$
//!
//! OPTIONS
//! ^rtmp:// | -re -rtmp_live live
//!
//! REPLACE
//! youtube\.com/watch | youtube\.com/embed
//! ```

use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use mediacast_common::{Error, Result};

use crate::options::parse_options;
use crate::pattern_map::PatternMap;
use crate::template::Replacement;

const PAYLOAD_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Exclude,
    Options,
    Replace,
}

impl Section {
    fn from_header(line: &str) -> Option<Self> {
        match line {
            "EXCLUDE" => Some(Self::Exclude),
            "OPTIONS" => Some(Self::Options),
            "REPLACE" => Some(Self::Replace),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Exclude => "EXCLUDE",
            Self::Options => "OPTIONS",
            Self::Replace => "REPLACE",
        }
    }
}

/// Accepted and rejected rule counts for one category.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CategoryReport {
    pub accepted: usize,
    pub rejected: usize,
}

/// A rule line that was not loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRule {
    pub line: usize,
    pub section: &'static str,
    pub pattern: String,
    pub reason: String,
}

/// What a load accepted and rejected.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub excludes: CategoryReport,
    pub options: CategoryReport,
    pub replacements: CategoryReport,
    pub rejected: Vec<RejectedRule>,
}

impl LoadReport {
    pub fn accepted(&self) -> usize {
        self.excludes.accepted + self.options.accepted + self.replacements.accepted
    }

    fn category(&mut self, section: Section) -> &mut CategoryReport {
        match section {
            Section::Exclude => &mut self.excludes,
            Section::Options => &mut self.options,
            Section::Replace => &mut self.replacements,
        }
    }
}

/// The three URL rule categories.
#[derive(Debug, Default)]
pub struct WebFilters {
    excludes: PatternMap<()>,
    options: PatternMap<Vec<String>>,
    replacements: PatternMap<Replacement>,
    source: RwLock<Option<PathBuf>>,
}

impl WebFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from `path`, replacing every category.
    ///
    /// An unreadable file is an error and leaves the current rules in place.
    pub fn load(&self, path: &Path) -> Result<LoadReport> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::config_io(path, e))?;
        *self.source.write() = Some(path.to_path_buf());
        let report = self.load_str(&text);
        tracing::info!(
            path = %path.display(),
            excludes = report.excludes.accepted,
            options = report.options.accepted,
            replacements = report.replacements.accepted,
            rejected = report.rejected.len(),
            "Loaded web filters"
        );
        Ok(report)
    }

    /// Reload from the file last passed to [`load`](Self::load).
    pub fn reload(&self) -> Result<LoadReport> {
        let path = self
            .source
            .read()
            .clone()
            .ok_or_else(|| Error::Validation("no rule file has been loaded".into()))?;
        self.load(&path)
    }

    pub fn source(&self) -> Option<PathBuf> {
        self.source.read().clone()
    }

    /// Parse rule text and swap it in, one category at a time.
    pub fn load_str(&self, text: &str) -> LoadReport {
        let excludes = PatternMap::new();
        let options = PatternMap::new();
        let replacements = PatternMap::new();
        let mut report = LoadReport::default();
        let mut section = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(s) = Section::from_header(line) {
                section = Some(s);
                continue;
            }
            let Some(section) = section else {
                continue;
            };

            let (pattern, payload) = match line.split_once(PAYLOAD_SEPARATOR) {
                Some((p, rest)) => (p, Some(rest)),
                None => (line, None),
            };

            let outcome = match section {
                Section::Exclude => excludes.insert(pattern, ()).map(drop),
                Section::Options => options
                    .insert(pattern, payload.map(parse_options).unwrap_or_default())
                    .map(drop),
                Section::Replace => match payload {
                    Some(template) => replacements.insert(pattern, Replacement::parse(template)).map(drop),
                    None => Err(Error::pattern(pattern, "REPLACE rule has no replacement")),
                },
            };

            match outcome {
                Ok(()) => report.category(section).accepted += 1,
                Err(e) => {
                    tracing::warn!(line = idx + 1, section = section.name(), error = %e, "Rejected web filter rule");
                    report.category(section).rejected += 1;
                    report.rejected.push(RejectedRule {
                        line: idx + 1,
                        section: section.name(),
                        pattern: pattern.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.excludes.replace_with(excludes);
        self.options.replace_with(options);
        self.replacements.replace_with(replacements);
        report
    }

    pub fn excludes(&self) -> &PatternMap<()> {
        &self.excludes
    }

    pub fn options(&self) -> &PatternMap<Vec<String>> {
        &self.options
    }

    pub fn replacements(&self) -> &PatternMap<Replacement> {
        &self.replacements
    }

    /// Whether `url` matches any `EXCLUDE` rule.
    pub fn is_excluded(&self, url: &str) -> bool {
        self.excludes.is_match(url)
    }

    /// Options from the first matching `OPTIONS` rule.
    pub fn auto_options_for(&self, url: &str) -> Option<Vec<String>> {
        self.options.payload_for(url)
    }

    /// Apply the first matching `REPLACE` rule; unmatched URLs come back unchanged.
    pub fn rewrite(&self, url: &str) -> String {
        self.replacements
            .with_match(url, |pattern, regex, replacement| {
                let out = replacement.apply(regex, url).into_owned();
                tracing::debug!(pattern, from = url, to = %out, "Rewrote url");
                out
            })
            .unwrap_or_else(|| url.to_string())
    }
}
