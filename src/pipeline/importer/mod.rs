// src/pipeline/importer/mod.rs

mod embedded;
mod error_capture;
mod parser;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::data_model::{
    Document, OnSet, ParseState, CONTENT_TYPE_FIELD, EMBEDDED_INDEX_FIELD,
    EMBEDDED_PARENT_FIELD, REFERENCE_FIELD,
};
use crate::error::{PipelineError, Result};
use crate::pipeline::handlers::{ChainOutcome, HandlerChain};
use crate::utils::prometheus_metrics::IMPORT_ERRORS_TOTAL;
use crate::utils::stream::CachedStreamFactory;

pub use embedded::{EmbeddedAction, EmbeddedPolicy};
pub use error_capture::save_parse_error;
pub use parser::{DocumentParser, EmbeddedContent, ParsedContent, ParserRegistry, PlainTextParser};

pub const DEFAULT_MAX_EMBEDDED_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Success,
    Rejected,
    Error,
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStatus::Success => f.write_str("SUCCESS"),
            ImportStatus::Rejected => f.write_str("REJECTED"),
            ImportStatus::Error => f.write_str("ERROR"),
        }
    }
}

/// Outcome of importing one document, with one nested response per split
/// embedded document. Only successful nodes carry a document.
#[derive(Debug)]
pub struct ImportResponse {
    pub reference: String,
    pub status: ImportStatus,
    pub document: Option<Document>,
    pub description: String,
    /// Kind of the error that failed this node.
    pub exception: Option<String>,
    pub nested: Vec<ImportResponse>,
}

impl ImportResponse {
    pub fn success(document: Document, nested: Vec<ImportResponse>) -> Self {
        ImportResponse {
            reference: document.reference.clone(),
            status: ImportStatus::Success,
            document: Some(document),
            description: "Success".to_string(),
            exception: None,
            nested,
        }
    }

    pub fn rejected(reference: impl Into<String>, description: impl Into<String>) -> Self {
        ImportResponse {
            reference: reference.into(),
            status: ImportStatus::Rejected,
            document: None,
            description: description.into(),
            exception: None,
            nested: Vec::new(),
        }
    }

    pub fn error(
        reference: impl Into<String>,
        description: impl Into<String>,
        exception: Option<String>,
    ) -> Self {
        ImportResponse {
            reference: reference.into(),
            status: ImportStatus::Error,
            document: None,
            description: description.into(),
            exception,
            nested: Vec::new(),
        }
    }

    pub fn with_nested(mut self, nested: Vec<ImportResponse>) -> Self {
        self.nested = nested;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ImportStatus::Success
    }

    /// Overrides the status. Non-success statuses release the document.
    pub fn set_status(&mut self, status: ImportStatus, description: impl Into<String>) {
        self.status = status;
        self.description = description.into();
        if status != ImportStatus::Success {
            self.document = None;
        }
    }

    /// This node plus every nested node, recursively.
    pub fn node_count(&self) -> usize {
        1 + self.nested.iter().map(ImportResponse::node_count).sum::<usize>()
    }

    /// Depth-first list of this node and all nested nodes.
    pub fn flatten(&self) -> Vec<&ImportResponse> {
        let mut out = vec![self];
        for child in &self.nested {
            out.extend(child.flatten());
        }
        out
    }
}

/// Inspects or rewrites an import response after a node is imported.
pub trait ResponseProcessor: Send + Sync {
    fn name(&self) -> &str {
        "ResponseProcessor"
    }

    fn process(&self, response: &mut ImportResponse) -> Result<()>;
}

enum NodeOutcome {
    Imported,
    Rejected(String),
}

/// Parses documents and runs the pre/post handler chains, recursing into
/// split embedded documents.
pub struct Importer {
    pre_handlers: HandlerChain,
    post_handlers: HandlerChain,
    parsers: ParserRegistry,
    embedded_policy: EmbeddedPolicy,
    max_embedded_depth: usize,
    errors_save_dir: Option<PathBuf>,
    default_content_type: Option<String>,
    response_processors: Vec<Arc<dyn ResponseProcessor>>,
    stream_factory: CachedStreamFactory,
}

impl Default for Importer {
    fn default() -> Self {
        Importer::new()
    }
}

impl Importer {
    pub fn new() -> Self {
        Importer {
            pre_handlers: HandlerChain::default(),
            post_handlers: HandlerChain::default(),
            parsers: ParserRegistry::default(),
            embedded_policy: EmbeddedPolicy::default(),
            max_embedded_depth: DEFAULT_MAX_EMBEDDED_DEPTH,
            errors_save_dir: None,
            default_content_type: None,
            response_processors: Vec::new(),
            stream_factory: CachedStreamFactory::default(),
        }
    }

    pub fn with_pre_handlers(mut self, chain: HandlerChain) -> Self {
        self.pre_handlers = chain;
        self
    }

    pub fn with_post_handlers(mut self, chain: HandlerChain) -> Self {
        self.post_handlers = chain;
        self
    }

    pub fn with_parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn with_embedded_policy(mut self, policy: EmbeddedPolicy) -> Self {
        self.embedded_policy = policy;
        self
    }

    pub fn with_max_embedded_depth(mut self, depth: usize) -> Self {
        self.max_embedded_depth = depth;
        self
    }

    pub fn with_errors_save_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.errors_save_dir = dir;
        self
    }

    pub fn with_default_content_type(mut self, content_type: Option<String>) -> Self {
        self.default_content_type = content_type;
        self
    }

    pub fn with_response_processors(mut self, processors: Vec<Arc<dyn ResponseProcessor>>) -> Self {
        self.response_processors = processors;
        self
    }

    /// Factory used for documents read by [`Importer::import_path`].
    pub fn with_stream_factory(mut self, factory: CachedStreamFactory) -> Self {
        self.stream_factory = factory;
        self
    }

    pub async fn import_document(&self, doc: Document) -> ImportResponse {
        self.import_node(doc, 0).await
    }

    /// Reads a local file and imports it. Read failures produce an `Error`
    /// response instead of an `Err`.
    pub async fn import_path(&self, path: &Path) -> ImportResponse {
        let reference = path.to_string_lossy().to_string();
        let factory = self.stream_factory.clone();
        let owned = path.to_path_buf();
        let read = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&owned)?;
            factory.from_reader(file)
        })
        .await;
        let stream = match read {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let err = PipelineError::from(e);
                return ImportResponse::error(reference, err.to_string(), Some(err.kind().to_string()));
            }
            Err(e) => {
                return ImportResponse::error(reference, e.to_string(), Some("Unexpected".to_string()));
            }
        };
        let doc = Document::new(reference, stream, self.stream_factory.clone());
        self.import_document(doc).await
    }

    fn import_node(&self, mut doc: Document, depth: usize) -> BoxFuture<'_, ImportResponse> {
        let span = info_span!("import", reference = %doc.reference, depth);
        async move {
            let reference = doc.reference.clone();
            if depth > self.max_embedded_depth {
                IMPORT_ERRORS_TOTAL.inc();
                return ImportResponse::error(
                    reference,
                    format!("Maximum embedded depth of {} exceeded", self.max_embedded_depth),
                    Some("DepthExceeded".to_string()),
                );
            }

            if doc.content_type.is_none() {
                doc.content_type = self.default_content_type.clone();
            }
            if let Some(ct) = &doc.content_type {
                doc.metadata.set(CONTENT_TYPE_FIELD, ct.clone());
            }
            doc.metadata
                .set_with(REFERENCE_FIELD, vec![reference.clone()], OnSet::Optional);

            let mut nested = Vec::new();
            let mut response = match self.process_node(&mut doc, depth, &mut nested).await {
                Ok(NodeOutcome::Imported) => ImportResponse::success(doc, nested),
                Ok(NodeOutcome::Rejected(reason)) => {
                    ImportResponse::rejected(reference, reason).with_nested(nested)
                }
                Err(e) => {
                    IMPORT_ERRORS_TOTAL.inc();
                    error!(error = %e, "Import failed");
                    ImportResponse::error(reference, e.to_string(), Some(e.kind().to_string()))
                        .with_nested(nested)
                }
            };
            self.apply_response_processors(&mut response);
            debug!(status = %response.status, nested = response.nested.len(), "Import node finished");
            response
        }
        .instrument(span)
        .boxed()
    }

    async fn process_node(
        &self,
        doc: &mut Document,
        depth: usize,
        nested: &mut Vec<ImportResponse>,
    ) -> Result<NodeOutcome> {
        if let ChainOutcome::Rejected { reason, .. } =
            self.pre_handlers.apply(doc, ParseState::Pre).await?
        {
            return Ok(NodeOutcome::Rejected(reason));
        }

        let content = doc.content_bytes()?;
        let parser = self.parsers.parser_for(doc.content_type.as_deref());
        debug!(parser = parser.name(), "Parsing document");
        let parsed = match parser.parse(doc, &content) {
            Ok(parsed) => parsed,
            Err(e) => {
                if let Some(dir) = &self.errors_save_dir {
                    if let Err(save_err) = save_parse_error(
                        dir,
                        &doc.reference,
                        doc.content_type.as_deref(),
                        &content,
                        &doc.metadata,
                        &e,
                    ) {
                        warn!(error = %save_err, "Could not save parse error artifacts");
                    }
                }
                return Err(e);
            }
        };
        drop(content);

        let mut text = parsed.text;
        for (index, part) in parsed.embedded.into_iter().enumerate() {
            let action = self
                .embedded_policy
                .decide(doc.content_type.as_deref(), part.content_type.as_deref());
            let child_reference = format!("{}!{}", doc.reference, part.name);
            match action {
                EmbeddedAction::Skip => {
                    debug!(child = %child_reference, "Skipping embedded document");
                }
                EmbeddedAction::Split => {
                    let child = self.embedded_document(doc, &child_reference, index, part)?;
                    nested.push(self.import_node(child, depth + 1).await);
                }
                EmbeddedAction::Inline => {
                    let part_type = part.content_type.clone();
                    let child = self.embedded_document(doc, &child_reference, index, part)?;
                    match self.inline_text(child, part_type.as_deref()) {
                        Ok(inline) => {
                            if !text.is_empty() && !inline.is_empty() {
                                text.push_str("\n\n");
                            }
                            text.push_str(&inline);
                        }
                        Err(e) => {
                            warn!(child = %child_reference, error = %e, "Could not parse embedded content, skipping");
                        }
                    }
                }
            }
        }

        doc.replace_content(text.into_bytes())?;
        doc.metadata.merge(&parsed.metadata, OnSet::Append);

        if let ChainOutcome::Rejected { reason, .. } =
            self.post_handlers.apply(doc, ParseState::Post).await?
        {
            return Ok(NodeOutcome::Rejected(reason));
        }
        Ok(NodeOutcome::Imported)
    }

    fn embedded_document(
        &self,
        parent: &Document,
        reference: &str,
        index: usize,
        part: EmbeddedContent,
    ) -> Result<Document> {
        let factory = parent.stream_factory().clone();
        let stream = factory.from_bytes(part.content)?;
        let mut child = Document::new(reference, stream, factory).with_metadata(part.metadata);
        child.content_type = part.content_type;
        child.metadata.set(EMBEDDED_PARENT_FIELD, parent.reference.clone());
        child.metadata.set(EMBEDDED_INDEX_FIELD, index.to_string());
        Ok(child)
    }

    fn inline_text(&self, mut child: Document, content_type: Option<&str>) -> Result<String> {
        let content = child.content_bytes()?;
        let parser = self.parsers.parser_for(content_type);
        Ok(parser.parse(&child, &content)?.text)
    }

    fn apply_response_processors(&self, response: &mut ImportResponse) {
        for processor in &self.response_processors {
            if let Err(e) = processor.process(response) {
                error!(processor = processor.name(), error = %e, "Response processor failed");
                response.set_status(ImportStatus::Error, e.to_string());
                response.exception = Some(e.kind().to_string());
                break;
            }
        }
    }
}

impl fmt::Debug for Importer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Importer")
            .field("pre_handlers", &self.pre_handlers)
            .field("post_handlers", &self.post_handlers)
            .field("parsers", &self.parsers)
            .field("embedded_policy", &self.embedded_policy)
            .field("max_embedded_depth", &self.max_embedded_depth)
            .field("errors_save_dir", &self.errors_save_dir)
            .field("default_content_type", &self.default_content_type)
            .field("response_processors", &self.response_processors.len())
            .finish()
    }
}
