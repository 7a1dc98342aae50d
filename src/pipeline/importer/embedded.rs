use serde::Deserialize;

use crate::utils::text_matcher::TextMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedAction {
    /// Dropped without producing a node.
    Skip,
    /// Imported as a child document with its own response.
    Split,
    /// Parsed and its text appended to the parent.
    Inline,
}

/// Decides what happens to embedded parts, by parent and part content type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmbeddedPolicy {
    /// Parents whose parts become separate documents.
    pub split_embedded_of: Vec<TextMatcher>,
    /// Parents whose parts are ignored entirely.
    pub skip_embedded_of: Vec<TextMatcher>,
    /// Parts ignored wherever they appear.
    pub skip_embedded: Vec<TextMatcher>,
}

impl EmbeddedPolicy {
    pub fn decide(&self, parent_type: Option<&str>, part_type: Option<&str>) -> EmbeddedAction {
        let parent = parent_type.unwrap_or_default();
        let part = part_type.unwrap_or_default();
        if any_match(&self.skip_embedded_of, parent) || any_match(&self.skip_embedded, part) {
            EmbeddedAction::Skip
        } else if any_match(&self.split_embedded_of, parent) {
            EmbeddedAction::Split
        } else {
            EmbeddedAction::Inline
        }
    }
}

fn any_match(matchers: &[TextMatcher], value: &str) -> bool {
    !value.is_empty() && matchers.iter().any(|m| m.matches(value))
}
