// src/pipeline/handlers/mod.rs

pub mod constant_tagger;
pub mod external;
pub mod field_report;
pub mod regex_replace;
pub mod text_filter;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::data_model::{Document, DocumentState, ParseState};
use crate::error::{PipelineError, Result};

pub use constant_tagger::ConstantTagger;
pub use external::ExternalProcessHandler;
pub use field_report::FieldReportTagger;
pub use regex_replace::RegexReplaceTransformer;
pub use text_filter::TextFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Tagger,
    Transformer,
    Filter,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Tagger => f.write_str("tagger"),
            HandlerKind::Transformer => f.write_str("transformer"),
            HandlerKind::Filter => f.write_str("filter"),
        }
    }
}

/// A step of the import handler chain.
///
/// `handle` returns `Ok(false)` to veto the document (only meaningful for
/// filters); taggers and transformers always return `Ok(true)`.
#[async_trait]
pub trait DocumentHandler: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> HandlerKind;

    async fn handle(&self, doc: &mut Document, parse_state: ParseState) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Completed,
    Rejected { handler: String, reason: String },
}

/// Ordered handlers applied to one document at one parse state.
#[derive(Clone, Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn DocumentHandler>>,
}

impl HandlerChain {
    pub fn new(handlers: Vec<Arc<dyn DocumentHandler>>) -> Self {
        HandlerChain { handlers }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Runs every handler in order. A filter veto marks the document
    /// `Rejected` and stops the chain; a handler error stops the chain and
    /// is returned wrapped with the handler's name.
    pub async fn apply(&self, doc: &mut Document, parse_state: ParseState) -> Result<ChainOutcome> {
        doc.parse_state = parse_state;
        for handler in &self.handlers {
            debug!(
                handler = handler.name(),
                kind = %handler.kind(),
                %parse_state,
                reference = %doc.reference,
                "Applying handler"
            );
            match handler.handle(doc, parse_state).await {
                Ok(true) => {}
                Ok(false) => {
                    let reason = format!(
                        "Rejected by {} {} at {} parse",
                        handler.kind(),
                        handler.name(),
                        parse_state
                    );
                    warn!(reference = %doc.reference, %reason, "Document vetoed by handler");
                    doc.state = DocumentState::Rejected;
                    return Ok(ChainOutcome::Rejected {
                        handler: handler.name().to_string(),
                        reason,
                    });
                }
                Err(e) => {
                    return Err(PipelineError::HandlerError {
                        handler: handler.name().to_string(),
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(ChainOutcome::Completed)
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("handlers", &self.handler_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::OnSet;
    use crate::pipeline::filters::OnMatch;
    use crate::utils::text_matcher::TextMatcher;

    struct Failing;

    #[async_trait]
    impl DocumentHandler for Failing {
        fn name(&self) -> &str {
            "Failing"
        }
        fn kind(&self) -> HandlerKind {
            HandlerKind::Transformer
        }
        async fn handle(&self, _doc: &mut Document, _ps: ParseState) -> Result<bool> {
            Err(PipelineError::Unexpected("boom".into()))
        }
    }

    #[tokio::test]
    async fn veto_stops_chain_and_rejects() {
        let chain = HandlerChain::new(vec![
            Arc::new(ConstantTagger::new(vec![("a".into(), vec!["1".into()])], OnSet::Append)),
            Arc::new(TextFilter::on_content(TextMatcher::basic("keep").unwrap(), OnMatch::Include)),
            Arc::new(ConstantTagger::new(vec![("b".into(), vec!["2".into()])], OnSet::Append)),
        ]);
        let mut doc = Document::from_bytes("ref", "nothing here");
        let outcome = chain.apply(&mut doc, ParseState::Post).await.unwrap();
        assert!(matches!(outcome, ChainOutcome::Rejected { ref handler, .. } if handler == "TextFilter"));
        assert_eq!(doc.state, DocumentState::Rejected);
        assert_eq!(doc.metadata.get("a"), Some("1"));
        assert!(!doc.metadata.contains_key("b"));
    }

    #[tokio::test]
    async fn handler_error_names_handler() {
        let chain = HandlerChain::new(vec![Arc::new(Failing)]);
        let mut doc = Document::from_bytes("ref", "x");
        let err = chain.apply(&mut doc, ParseState::Pre).await.unwrap_err();
        assert!(matches!(err, PipelineError::HandlerError { ref handler, .. } if handler == "Failing"));
    }
}
