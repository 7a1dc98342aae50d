// src/pipeline/stages/mod.rs

mod commit;
mod fetch;
mod filtering;
mod import;
mod robots;

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::data_model::{Document, DocumentState};
use crate::events::{CrawlerEvent, CrawlerEventKind, CrawlerEventListener};
use crate::executor::{PipelineExecutor, StageContext};
use crate::pipeline::committer::CommitDispatcher;
use crate::pipeline::fetch::{FetchCoordinator, FetchMethod, FetchRequest, FetchResponse};
use crate::pipeline::filters::Filter;
use crate::pipeline::importer::{ImportResponse, Importer};
use crate::utils::stream::CachedStreamFactory;

pub use commit::CommitStage;
pub use fetch::FetchStage;
pub use filtering::{DocumentFiltersStage, MetadataFiltersStage, ReferenceFiltersStage};
pub use import::ImportStage;
pub use robots::{RobotsMeta, RobotsMetaNoIndexStage, RobotsMetaStage};

/// Components shared read-only by every worker.
pub struct CrawlerServices {
    pub reference_filters: Vec<Arc<dyn Filter>>,
    pub metadata_filters: Vec<Arc<dyn Filter>>,
    pub document_filters: Vec<Arc<dyn Filter>>,
    pub fetcher: FetchCoordinator,
    pub fetch_method: FetchMethod,
    pub importer: Importer,
    pub committers: CommitDispatcher,
    pub listeners: Vec<Arc<dyn CrawlerEventListener>>,
    pub stream_factory: CachedStreamFactory,
    pub ignore_robots_meta: bool,
}

impl CrawlerServices {
    pub fn fire(&self, kind: CrawlerEventKind, reference: Option<&str>, message: impl Into<String>) {
        let event = CrawlerEvent::new(kind, reference, message);
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }
}

impl fmt::Debug for CrawlerServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlerServices")
            .field("reference_filters", &self.reference_filters.len())
            .field("metadata_filters", &self.metadata_filters.len())
            .field("document_filters", &self.document_filters.len())
            .field("fetch_method", &self.fetch_method)
            .field("importer", &self.importer)
            .field("committers", &self.committers.committer_names())
            .field("listeners", &self.listeners.len())
            .field("ignore_robots_meta", &self.ignore_robots_meta)
            .finish()
    }
}

/// Per-reference state carried through the crawler stages.
pub struct PipelineContext {
    pub services: Arc<CrawlerServices>,
    pub request: FetchRequest,
    pub document: Document,
    pub fetch_response: Option<FetchResponse>,
    pub robots_meta: Option<RobotsMeta>,
    pub import_response: Option<ImportResponse>,
    /// Why the document left the `New` state, when it did.
    pub reason: Option<String>,
    cancel: CancellationToken,
}

impl PipelineContext {
    pub fn new(
        reference: impl Into<String>,
        services: Arc<CrawlerServices>,
        cancel: CancellationToken,
    ) -> Self {
        let reference = reference.into();
        let factory = services.stream_factory.clone();
        let request = FetchRequest::new(reference.clone(), services.fetch_method)
            .with_stream_factory(factory.clone());
        let document = Document::new(reference, factory.empty(), factory);
        PipelineContext {
            services,
            request,
            document,
            fetch_response: None,
            robots_meta: None,
            import_response: None,
            reason: None,
            cancel,
        }
    }

    pub fn reference(&self) -> &str {
        &self.request.reference
    }

    /// Moves the document to a terminal state and records why.
    pub fn finish(&mut self, state: DocumentState, reason: impl Into<String>) {
        self.document.state = state;
        self.reason = Some(reason.into());
    }

    pub fn fire(&self, kind: CrawlerEventKind, message: impl Into<String>) {
        self.services.fire(kind, Some(self.reference()), message);
    }
}

impl StageContext for PipelineContext {
    fn document_state(&self) -> DocumentState {
        self.document.state
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The standard crawl: reference filters, fetch, metadata filters, robots
/// meta, import, document filters, commit.
pub fn crawler_pipeline() -> PipelineExecutor<PipelineContext> {
    PipelineExecutor::new(vec![
        Box::new(ReferenceFiltersStage),
        Box::new(FetchStage),
        Box::new(MetadataFiltersStage),
        Box::new(RobotsMetaStage),
        Box::new(RobotsMetaNoIndexStage),
        Box::new(ImportStage),
        Box::new(DocumentFiltersStage),
        Box::new(CommitStage),
    ])
}
