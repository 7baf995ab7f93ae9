//! Replacement templates for `REPLACE` rules.
//!
//! Rule files write templates the way regex-replacement strings are usually
//! written: `$1` or `${name}` insert a group and a backslash makes the next
//! character literal. [`Replacement::parse`] turns that into the syntax the
//! `regex` crate expands, where `$$` is a literal dollar and `$1a` would
//! name a group called `1a`.

use std::borrow::Cow;

use regex::Regex;

/// A parsed replacement template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    source: String,
    expanded: String,
}

impl Replacement {
    pub fn parse(source: &str) -> Self {
        Self {
            source: source.to_string(),
            expanded: translate(source),
        }
    }

    /// The template as written in the rule file.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The template in `regex` expansion syntax.
    pub fn expanded(&self) -> &str {
        &self.expanded
    }

    /// Replace every match of `regex` in `input`.
    pub fn apply<'a>(&self, regex: &Regex, input: &'a str) -> Cow<'a, str> {
        regex.replace_all(input, self.expanded.as_str())
    }
}

fn translate(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + 4);
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('$') => out.push_str("$$"),
                Some(next) => out.push(next),
                None => out.push('\\'),
            },
            '$' => match chars.peek() {
                Some(d) if d.is_ascii_digit() => {
                    let mut digits = String::new();
                    while let Some(&d) = chars.peek() {
                        if !d.is_ascii_digit() {
                            break;
                        }
                        digits.push(d);
                        chars.next();
                    }
                    out.push_str("${");
                    out.push_str(&digits);
                    out.push('}');
                }
                Some('{') => {
                    // Chars of `{name}` including both braces.
                    let group_len = chars.clone().position(|ch| ch == '}').map(|end| end + 1);
                    match group_len {
                        Some(len) if len > 2 => {
                            out.push('$');
                            out.extend(chars.by_ref().take(len));
                        }
                        _ => out.push_str("$$"),
                    }
                }
                _ => out.push_str("$$"),
            },
            other => out.push(other),
        }
    }
    out
}
