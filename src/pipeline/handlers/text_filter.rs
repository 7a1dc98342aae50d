use async_trait::async_trait;

use super::{DocumentHandler, HandlerKind};
use crate::data_model::{Document, ParseState};
use crate::error::Result;
use crate::pipeline::filters::OnMatch;
use crate::utils::text_matcher::TextMatcher;

/// Keeps or drops a document based on its content, or on the values of one
/// metadata field.
///
/// With `Include` a document is kept only when the matcher matches; with
/// `Exclude` it is dropped when the matcher matches.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFilter {
    field: Option<String>,
    matcher: TextMatcher,
    on_match: OnMatch,
}

impl TextFilter {
    pub fn on_content(matcher: TextMatcher, on_match: OnMatch) -> Self {
        TextFilter {
            field: None,
            matcher,
            on_match,
        }
    }

    pub fn on_field(field: impl Into<String>, matcher: TextMatcher, on_match: OnMatch) -> Self {
        TextFilter {
            field: Some(field.into()),
            matcher,
            on_match,
        }
    }
}

#[async_trait]
impl DocumentHandler for TextFilter {
    fn name(&self) -> &str {
        "TextFilter"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Filter
    }

    async fn handle(&self, doc: &mut Document, _parse_state: ParseState) -> Result<bool> {
        let matched = match &self.field {
            Some(field) => doc
                .metadata
                .get_all(field)
                .iter()
                .any(|value| self.matcher.matches(value)),
            None => {
                let text = doc.content_string()?;
                self.matcher.matches(&text)
            }
        };
        Ok(match self.on_match {
            OnMatch::Include => matched,
            OnMatch::Exclude => !matched,
        })
    }
}
