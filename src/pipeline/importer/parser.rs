use std::fmt;
use std::sync::Arc;

use crate::data_model::{Document, Metadata};
use crate::error::Result;
use crate::utils::text_matcher::TextMatcher;

/// A part found inside a parsed document (archive entry, attachment, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedContent {
    /// Name relative to the parent, used to build `parent!name`.
    pub name: String,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedContent {
    pub text: String,
    pub metadata: Metadata,
    pub embedded: Vec<EmbeddedContent>,
}

impl ParsedContent {
    pub fn text(text: impl Into<String>) -> Self {
        ParsedContent {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Turns raw document bytes into text, metadata and embedded parts.
pub trait DocumentParser: Send + Sync {
    fn name(&self) -> &str;

    fn parse(&self, doc: &Document, content: &[u8]) -> Result<ParsedContent>;
}

/// Decodes content as UTF-8, replacing invalid sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn name(&self) -> &str {
        "PlainTextParser"
    }

    fn parse(&self, _doc: &Document, content: &[u8]) -> Result<ParsedContent> {
        Ok(ParsedContent::text(String::from_utf8_lossy(content)))
    }
}

/// Parsers keyed by content-type pattern; first match wins, the default
/// parser handles everything else.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: Vec<(TextMatcher, Arc<dyn DocumentParser>)>,
    default_parser: Arc<dyn DocumentParser>,
}

impl ParserRegistry {
    pub fn new(default_parser: Arc<dyn DocumentParser>) -> Self {
        ParserRegistry {
            parsers: Vec::new(),
            default_parser,
        }
    }

    pub fn register(&mut self, content_type: TextMatcher, parser: Arc<dyn DocumentParser>) {
        self.parsers.push((content_type, parser));
    }

    pub fn set_default(&mut self, parser: Arc<dyn DocumentParser>) {
        self.default_parser = parser;
    }

    pub fn parser_for(&self, content_type: Option<&str>) -> &Arc<dyn DocumentParser> {
        content_type
            .and_then(|ct| {
                self.parsers
                    .iter()
                    .find(|(matcher, _)| matcher.matches(ct))
                    .map(|(_, parser)| parser)
            })
            .unwrap_or(&self.default_parser)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        ParserRegistry::new(Arc::new(PlainTextParser))
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field(
                "parsers",
                &self
                    .parsers
                    .iter()
                    .map(|(m, p)| (m.pattern(), p.name()))
                    .collect::<Vec<_>>(),
            )
            .field("default_parser", &self.default_parser.name())
            .finish()
    }
}
