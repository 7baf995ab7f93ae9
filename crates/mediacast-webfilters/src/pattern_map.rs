//! [`PatternMap`]: regex-keyed rules matched in a single pass.
//!
//! Every pattern becomes one capturing group of a combined alternation,
//! `(p1)|(p2)|...`, in insertion order. A side table records which pattern
//! owns each group index (sub-groups inside a pattern belong to it too), so
//! the first participating group names the winning rule. At any one match
//! position the earliest-registered pattern wins.
//!
//! Edits only mark the map dirty; the combined matcher is rebuilt by the
//! next query. Queries share a read lock; a query that finds the map dirty
//! takes the write lock, recompiles, and downgrades, so other queries wait
//! for that one rebuild.

use std::collections::HashSet;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use regex::Regex;

use mediacast_common::{Error, Result};

#[derive(Debug, Clone)]
struct Rule<T> {
    regex: Regex,
    payload: T,
}

#[derive(Debug)]
struct Compiled {
    combo: Regex,
    /// Pattern text for each rule, in alternation order.
    patterns: Vec<String>,
    /// Owner (index into `patterns`) of capture group `i + 1`.
    owners: Vec<usize>,
}

#[derive(Debug)]
struct Inner<T> {
    rules: IndexMap<String, Rule<T>>,
    compiled: Option<Compiled>,
    dirty: bool,
    compiles: u64,
    last_error: Option<String>,
}

impl<T> Default for Inner<T> {
    fn default() -> Self {
        Self {
            rules: IndexMap::new(),
            compiled: None,
            dirty: false,
            compiles: 0,
            last_error: None,
        }
    }
}

impl<T> Inner<T> {
    fn recompile(&mut self) {
        self.dirty = false;
        if self.rules.is_empty() {
            self.compiled = None;
            self.last_error = None;
            return;
        }

        let joined = self
            .rules
            .keys()
            .map(|p| format!("({p})"))
            .collect::<Vec<_>>()
            .join("|");

        let mut owners = Vec::new();
        for (idx, rule) in self.rules.values().enumerate() {
            // captures_len counts the implicit whole-match group, which
            // stands in for the wrapping group added above.
            owners.extend(std::iter::repeat(idx).take(rule.regex.captures_len()));
        }

        match Regex::new(&joined) {
            Ok(combo) => {
                self.compiles += 1;
                self.last_error = None;
                tracing::debug!(rules = self.rules.len(), groups = owners.len(), "Compiled combined pattern");
                self.compiled = Some(Compiled {
                    combo,
                    patterns: self.rules.keys().cloned().collect(),
                    owners,
                });
            }
            Err(e) => {
                tracing::error!(
                    rules = self.rules.len(),
                    error = %e,
                    "Combined pattern failed to compile; keeping last good matcher"
                );
                self.last_error = Some(e.to_string());
            }
        }
    }

    fn winner(&self, input: &str) -> Option<&str> {
        let compiled = self.compiled.as_ref()?;
        let caps = compiled.combo.captures(input)?;
        let group = caps.iter().skip(1).position(|m| m.is_some())?;
        let owner = *compiled.owners.get(group)?;
        compiled.patterns.get(owner).map(String::as_str)
    }
}

/// A pattern must stay one self-contained group once wrapped, or it would
/// break the alternation for every other rule. `(?x)` comments running to
/// the end of the pattern swallow the closing paren, for one.
fn check_wrapped(pattern: &str, regex: &Regex) -> Result<()> {
    let wrapped = Regex::new(&format!("({pattern})")).map_err(|e| {
        Error::pattern(pattern, format!("pattern cannot be combined with other rules: {e}"))
    })?;
    if wrapped.captures_len() != regex.captures_len() + 1 {
        return Err(Error::pattern(pattern, "pattern cannot be combined with other rules"));
    }
    Ok(())
}

/// An ordered, concurrency-safe map from regex pattern to payload.
#[derive(Debug)]
pub struct PatternMap<T> {
    inner: RwLock<Inner<T>>,
}

impl<T> Default for PatternMap<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl<T> PatternMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a rule, returning the previous payload for `pattern`.
    ///
    /// The pattern is validated on its own and as the group it becomes in
    /// the combined matcher, and rejected if it reuses a group name another
    /// rule already declares. Replacing a pattern keeps its position.
    pub fn insert(&self, pattern: &str, payload: T) -> Result<Option<T>> {
        let regex = Regex::new(pattern).map_err(|e| Error::pattern(pattern, e))?;
        check_wrapped(pattern, &regex)?;

        let mut inner = self.inner.write();
        let names: HashSet<&str> = regex.capture_names().flatten().collect();
        if !names.is_empty() {
            let clash = inner
                .rules
                .iter()
                .filter(|(p, _)| p.as_str() != pattern)
                .flat_map(|(_, r)| r.regex.capture_names().flatten())
                .find(|n| names.contains(n))
                .map(str::to_string);
            if let Some(name) = clash {
                return Err(Error::pattern(pattern, format!("group name `{name}` is already used by another rule")));
            }
        }

        let previous = inner
            .rules
            .insert(pattern.to_string(), Rule { regex, payload })
            .map(|r| r.payload);
        inner.dirty = true;
        Ok(previous)
    }

    pub fn remove(&self, pattern: &str) -> Option<T> {
        let mut inner = self.inner.write();
        let removed = inner.rules.shift_remove(pattern).map(|r| r.payload);
        if removed.is_some() {
            inner.dirty = true;
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.rules.clear();
        inner.dirty = true;
    }

    /// Replace every rule with those of `other` in one step.
    pub fn replace_with(&self, other: PatternMap<T>) {
        let rules = other.inner.into_inner().rules;
        let mut inner = self.inner.write();
        inner.rules = rules;
        inner.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.inner.read().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().rules.is_empty()
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.inner.read().rules.contains_key(pattern)
    }

    /// Patterns in registration order.
    pub fn patterns(&self) -> Vec<String> {
        self.inner.read().rules.keys().cloned().collect()
    }

    /// How many times the combined matcher has been successfully built.
    pub fn compile_count(&self) -> u64 {
        self.inner.read().compiles
    }

    /// The error from the most recent failed rebuild, if the current
    /// matcher is stale because of it.
    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    fn read_compiled(&self) -> RwLockReadGuard<'_, Inner<T>> {
        let guard = self.inner.read();
        if !guard.dirty {
            return guard;
        }
        drop(guard);

        let mut guard = self.inner.write();
        if guard.dirty {
            guard.recompile();
        }
        RwLockWriteGuard::downgrade(guard)
    }

    /// The pattern of the winning rule for `input`.
    pub fn matching_pattern(&self, input: &str) -> Option<String> {
        self.read_compiled().winner(input).map(str::to_string)
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.read_compiled().winner(input).is_some()
    }

    /// Run `f` against the winning rule's own regex and payload.
    pub fn with_match<R>(&self, input: &str, f: impl FnOnce(&str, &Regex, &T) -> R) -> Option<R> {
        let inner = self.read_compiled();
        let pattern = inner.winner(input)?;
        let rule = inner.rules.get(pattern)?;
        Some(f(pattern, &rule.regex, &rule.payload))
    }
}

impl<T: Clone> PatternMap<T> {
    /// The winning rule's payload for `input`.
    pub fn payload_for(&self, input: &str) -> Option<T> {
        self.with_match(input, |_, _, payload| payload.clone())
    }

    pub fn get(&self, pattern: &str) -> Option<T> {
        self.inner.read().rules.get(pattern).map(|r| r.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    #[test]
    fn empty_map_matches_nothing() {
        let map: PatternMap<()> = PatternMap::new();
        assert!(!map.is_match("anything"));
        assert_eq!(map.compile_count(), 0);
    }

    #[test]
    fn first_registered_pattern_wins() {
        let map = PatternMap::new();
        map.insert(r".*\.m3u8$", 1).unwrap();
        map.insert(r"http://x/.*", 2).unwrap();
        assert_eq!(map.matching_pattern("http://x/stream.m3u8").as_deref(), Some(r".*\.m3u8$"));
        assert_eq!(map.payload_for("http://x/stream.m3u8"), Some(1));
        assert_eq!(map.payload_for("http://x/stream.mp4"), Some(2));
        assert_eq!(map.payload_for("rtmp://y/live"), None);
    }

    #[test]
    fn sub_groups_map_to_their_owner() {
        let map = PatternMap::new();
        map.insert(r"(a)(b)(c)x", "abc").unwrap();
        map.insert(r"(?:d)(e)", "de").unwrap();
        map.insert(r"f(g)", "fg").unwrap();
        assert_eq!(map.payload_for("zzfg"), Some("fg"));
        assert_eq!(map.payload_for("de"), Some("de"));
        assert_eq!(map.payload_for("abcx"), Some("abc"));
    }

    #[test]
    fn recompiles_lazily_once_per_edit() {
        let map = PatternMap::new();
        map.insert("a", ()).unwrap();
        map.insert("b", ()).unwrap();
        assert_eq!(map.compile_count(), 0);

        assert!(map.is_match("b"));
        assert!(map.is_match("a"));
        assert_eq!(map.compile_count(), 1);

        map.remove("a");
        assert!(!map.is_match("a"));
        assert_eq!(map.compile_count(), 2);
    }

    #[test]
    fn invalid_pattern_rejected_and_existing_rules_kept() {
        let map = PatternMap::new();
        map.insert("good", ()).unwrap();
        assert_matches!(map.insert("(unclosed", ()), Err(Error::PatternCompile { .. }));
        assert_eq!(map.patterns(), vec!["good"]);
        assert!(map.is_match("good"));
    }

    #[test]
    fn pattern_that_breaks_the_alternation_is_rejected() {
        let map = PatternMap::new();
        map.insert(r"\.m3u8$", ()).unwrap();
        assert!(Regex::new("(?x)foo #note").is_ok());
        assert_matches!(map.insert("(?x)foo #note", ()), Err(Error::PatternCompile { .. }));
        map.insert("(?x)foo #note\n", ()).unwrap();

        assert!(map.is_match("http://x/a.m3u8"));
        assert!(map.is_match("foo"));
        assert!(map.last_error().is_none());
    }

    #[test]
    fn duplicate_group_names_rejected() {
        let map = PatternMap::new();
        map.insert(r"v=(?P<id>\w+)", ()).unwrap();
        assert_matches!(map.insert(r"video/(?P<id>\d+)", ()), Err(Error::PatternCompile { .. }));
        map.insert(r"v=(?P<id>\w+)", ()).unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn replacing_keeps_position() {
        let map = PatternMap::new();
        map.insert("x", 1).unwrap();
        map.insert("x.*", 2).unwrap();
        assert_eq!(map.insert("x", 3).unwrap(), Some(1));
        assert_eq!(map.patterns(), vec!["x", "x.*"]);
        assert_eq!(map.payload_for("xyz"), Some(3));
    }

    #[test]
    fn replace_with_swaps_whole_rule_set() {
        let map = PatternMap::new();
        map.insert("old", ()).unwrap();
        let fresh = PatternMap::new();
        fresh.insert("new", ()).unwrap();
        map.replace_with(fresh);
        assert!(!map.is_match("old"));
        assert!(map.is_match("new"));
    }

    #[test]
    fn concurrent_queries_during_edits() {
        let map = Arc::new(PatternMap::new());
        map.insert(r"\.m3u8$", true).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let map = map.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        assert_eq!(map.payload_for("http://x/a.m3u8"), Some(true));
                    }
                })
            })
            .collect();

        for i in 0..100 {
            map.insert(&format!("^rule{i}$"), false).unwrap();
        }
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(map.len(), 101);
    }
}
