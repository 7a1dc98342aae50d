use crate::utils::text_matcher::TextMatcher;

use super::{Filter, FilterTarget, OnMatch};

/// Matches the document reference against a pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct RegexReferenceFilter {
    matcher: TextMatcher,
    on_match: OnMatch,
}

impl RegexReferenceFilter {
    pub fn new(matcher: TextMatcher, on_match: OnMatch) -> Self {
        RegexReferenceFilter { matcher, on_match }
    }
}

impl Filter for RegexReferenceFilter {
    fn name(&self) -> &'static str {
        "RegexReferenceFilter"
    }

    fn on_match(&self) -> OnMatch {
        self.on_match
    }

    fn matches(&self, target: &FilterTarget<'_>) -> bool {
        self.matcher.matches(target.reference())
    }
}

/// Matches when any value of `field` matches the value pattern. A bare
/// reference has no metadata and never matches.
#[derive(Debug, Clone, PartialEq)]
pub struct RegexMetadataFilter {
    field: String,
    value_matcher: TextMatcher,
    on_match: OnMatch,
}

impl RegexMetadataFilter {
    pub fn new(field: impl Into<String>, value_matcher: TextMatcher, on_match: OnMatch) -> Self {
        RegexMetadataFilter {
            field: field.into(),
            value_matcher,
            on_match,
        }
    }
}

impl Filter for RegexMetadataFilter {
    fn name(&self) -> &'static str {
        "RegexMetadataFilter"
    }

    fn on_match(&self) -> OnMatch {
        self.on_match
    }

    fn matches(&self, target: &FilterTarget<'_>) -> bool {
        target.metadata().is_some_and(|metadata| {
            metadata
                .get_all(&self.field)
                .iter()
                .any(|value| self.value_matcher.matches(value))
        })
    }
}
