// src/utils/text_matcher.rs

use regex::Regex;
use serde::Deserialize;

/// How a [`TextMatcher`] pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    /// Literal text.
    Basic,
    /// `*` matches any run of characters, `?` a single character.
    #[default]
    Wildcard,
    Regex,
}

/// A compiled text pattern used for content types, field names and values.
///
/// In YAML a matcher is either a plain string (a case-insensitive wildcard)
/// or a map with `pattern`, `method`, `ignore_case` and `partial`.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "TextMatcherSpec")]
pub struct TextMatcher {
    pattern: String,
    method: MatchMethod,
    ignore_case: bool,
    partial: bool,
    compiled: Regex,
}

impl PartialEq for TextMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
            && self.method == other.method
            && self.ignore_case == other.ignore_case
            && self.partial == other.partial
    }
}

impl TextMatcher {
    pub fn new(
        pattern: &str,
        method: MatchMethod,
        ignore_case: bool,
        partial: bool,
    ) -> Result<Self, regex::Error> {
        let body = match method {
            MatchMethod::Basic => regex::escape(pattern),
            MatchMethod::Wildcard => wildcard_to_regex(pattern),
            MatchMethod::Regex => pattern.to_string(),
        };
        let anchored = if partial {
            body
        } else {
            format!("^(?:{})$", body)
        };
        let full = if ignore_case {
            format!("(?is){}", anchored)
        } else {
            format!("(?s){}", anchored)
        };
        Ok(TextMatcher {
            pattern: pattern.to_string(),
            method,
            ignore_case,
            partial,
            compiled: Regex::new(&full)?,
        })
    }

    pub fn wildcard(pattern: &str) -> Result<Self, regex::Error> {
        TextMatcher::new(pattern, MatchMethod::Wildcard, true, false)
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        TextMatcher::new(pattern, MatchMethod::Regex, false, true)
    }

    pub fn basic(pattern: &str) -> Result<Self, regex::Error> {
        TextMatcher::new(pattern, MatchMethod::Basic, false, false)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, text: &str) -> bool {
        self.compiled.is_match(text)
    }
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextMatcherSpec {
    Pattern(String),
    Full {
        pattern: String,
        #[serde(default)]
        method: MatchMethod,
        #[serde(default = "default_ignore_case")]
        ignore_case: bool,
        #[serde(default)]
        partial: bool,
    },
}

fn default_ignore_case() -> bool {
    true
}

impl TryFrom<TextMatcherSpec> for TextMatcher {
    type Error = regex::Error;

    fn try_from(spec: TextMatcherSpec) -> Result<Self, Self::Error> {
        match spec {
            TextMatcherSpec::Pattern(pattern) => TextMatcher::wildcard(&pattern),
            TextMatcherSpec::Full {
                pattern,
                method,
                ignore_case,
                partial,
            } => TextMatcher::new(&pattern, method, ignore_case, partial),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_whole_value_ignoring_case() {
        let m = TextMatcher::wildcard("*zip").unwrap();
        assert!(m.matches("application/zip"));
        assert!(m.matches("APPLICATION/ZIP"));
        assert!(!m.matches("application/zip-compressed"));
    }

    #[test]
    fn basic_partial_is_a_contains_check() {
        let m = TextMatcher::new("application/pdf", MatchMethod::Basic, false, true).unwrap();
        assert!(m.matches("application/pdf; charset=binary"));
        assert!(!m.matches("text/html"));
    }

    #[test]
    fn deserializes_from_plain_string_and_map() {
        let plain: TextMatcher = serde_yaml::from_str("\"*jpeg\"").unwrap();
        assert!(plain.matches("image/jpeg"));

        let full: TextMatcher =
            serde_yaml::from_str("pattern: '^text/.*'\nmethod: regex\nignore_case: false").unwrap();
        assert!(full.matches("text/plain"));
        assert!(!full.matches("TEXT/plain"));
    }
}
