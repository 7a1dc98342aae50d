use async_trait::async_trait;
use regex::Regex;

use super::{DocumentHandler, HandlerKind};
use crate::data_model::{Document, ParseState};
use crate::error::Result;

/// Replaces every match of `pattern` in the content, or in the values of a
/// field when one is set. Capture references like `$1` are expanded.
#[derive(Debug, Clone)]
pub struct RegexReplaceTransformer {
    pattern: Regex,
    replacement: String,
    field: Option<String>,
}

impl RegexReplaceTransformer {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        Ok(RegexReplaceTransformer {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
            field: None,
        })
    }

    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl PartialEq for RegexReplaceTransformer {
    fn eq(&self, other: &Self) -> bool {
        self.pattern.as_str() == other.pattern.as_str()
            && self.replacement == other.replacement
            && self.field == other.field
    }
}

#[async_trait]
impl DocumentHandler for RegexReplaceTransformer {
    fn name(&self) -> &str {
        "RegexReplaceTransformer"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Transformer
    }

    async fn handle(&self, doc: &mut Document, _parse_state: ParseState) -> Result<bool> {
        match &self.field {
            Some(field) => {
                let replaced: Vec<String> = doc
                    .metadata
                    .get_all(field)
                    .iter()
                    .map(|v| self.pattern.replace_all(v, self.replacement.as_str()).into_owned())
                    .collect();
                if !replaced.is_empty() {
                    doc.metadata.set_all(field.clone(), replaced);
                }
            }
            None => {
                let text = doc.content_string()?;
                let replaced = self.pattern.replace_all(&text, self.replacement.as_str());
                doc.replace_content(replaced.into_owned().into_bytes())?;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replaces_content_with_groups() {
        let t = RegexReplaceTransformer::new(r"(\w+)@(\w+)", "$2 at $1").unwrap();
        let mut doc = Document::from_bytes("r", "mail john@example now");
        t.handle(&mut doc, ParseState::Post).await.unwrap();
        assert_eq!(doc.content_string().unwrap(), "mail example at john now");
    }
}
