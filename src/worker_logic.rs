// src/worker_logic.rs

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::config::{ComponentConfig, CrawlerConfig, ImporterSettings};
use crate::data_model::DocumentState;
use crate::error::{PipelineError, Result};
use crate::events::{CrawlerEventKind, CrawlerEventListener};
use crate::executor::PipelineExecutor;
use crate::pipeline::committer::CommitDispatcher;
use crate::pipeline::fetch::FetchCoordinator;
use crate::pipeline::filters::Filter;
use crate::pipeline::handlers::HandlerChain;
use crate::pipeline::importer::Importer;
use crate::pipeline::stages::{crawler_pipeline, CrawlerServices, PipelineContext};
use crate::registry::ComponentRegistry;
use crate::utils::prometheus_metrics::*;
use crate::utils::stream::CachedStreamFactory;

fn build_filters(
    phase: &str,
    entries: &[ComponentConfig],
    registry: &ComponentRegistry,
) -> Result<Vec<Arc<dyn Filter>>> {
    let mut filters = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let span = info_span!("filter", phase, index = i, type = %entry.kind);
        let _enter = span.enter();
        filters.push(registry.build_filter(entry)?);
        debug!("Added filter");
    }
    Ok(filters)
}

fn build_handler_chain(
    phase: &str,
    entries: &[ComponentConfig],
    registry: &ComponentRegistry,
) -> Result<HandlerChain> {
    let mut handlers = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let span = info_span!("handler", phase, index = i, type = %entry.kind);
        let _enter = span.enter();
        handlers.push(registry.build_handler(entry)?);
        debug!("Added handler");
    }
    Ok(HandlerChain::new(handlers))
}

/// Builds the importer described by the `importer` section.
#[instrument(skip_all, fields(
    pre = settings.pre_parse_handlers.len(),
    post = settings.post_parse_handlers.len()
))]
pub fn build_importer_from_config(
    settings: &ImporterSettings,
    registry: &ComponentRegistry,
    stream_factory: CachedStreamFactory,
) -> Result<Importer> {
    let pre = build_handler_chain("pre_parse", &settings.pre_parse_handlers, registry)?;
    let post = build_handler_chain("post_parse", &settings.post_parse_handlers, registry)?;
    info!(
        pre_handlers = ?pre.handler_names(),
        post_handlers = ?post.handler_names(),
        "Importer built"
    );
    Ok(Importer::new()
        .with_pre_handlers(pre)
        .with_post_handlers(post)
        .with_embedded_policy(settings.embedded.clone())
        .with_max_embedded_depth(settings.max_embedded_depth)
        .with_errors_save_dir(settings.errors_save_dir.clone())
        .with_default_content_type(settings.default_content_type.clone())
        .with_stream_factory(stream_factory))
}

/// Builds every crawler component named in the configuration. Any unknown
/// type or invalid parameter aborts the build.
#[instrument(skip_all, fields(
    fetchers = config.crawler.fetchers.len(),
    committers = config.committers.len()
))]
pub fn build_services_from_config(
    config: &CrawlerConfig,
    registry: &ComponentRegistry,
    listeners: Vec<Arc<dyn CrawlerEventListener>>,
) -> Result<CrawlerServices> {
    info!("Building crawler components from configuration...");
    config.validate()?;
    let settings = &config.crawler;
    let stream_factory = settings.stream_factory();

    let mut fetchers = Vec::with_capacity(settings.fetchers.len());
    for entry in &settings.fetchers {
        fetchers.push(registry.build_fetcher(entry)?);
    }

    let mut committers = Vec::with_capacity(config.committers.len());
    for entry in &config.committers {
        committers.push(registry.build_committer(entry)?);
    }
    if committers.is_empty() {
        warn!("No committers configured; accepted documents will be discarded.");
    }

    let services = CrawlerServices {
        reference_filters: build_filters("reference", &settings.reference_filters, registry)?,
        metadata_filters: build_filters("metadata", &settings.metadata_filters, registry)?,
        document_filters: build_filters("document", &settings.document_filters, registry)?,
        fetcher: FetchCoordinator::new(fetchers, settings.retry_policy()),
        fetch_method: settings.fetch_method,
        importer: build_importer_from_config(&config.importer, registry, stream_factory.clone())?,
        committers: CommitDispatcher::new(committers),
        listeners,
        stream_factory,
        ignore_robots_meta: settings.ignore_robots_meta,
    };
    info!(services = ?services, "Crawler components built");
    Ok(services)
}

/// Reads one reference per line; blank lines and `#` comments are skipped.
pub fn read_references<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        PipelineError::ConfigError(format!(
            "Failed to read references file '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Final state of one crawled reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOutcome {
    pub reference: String,
    pub state: DocumentState,
    pub reason: Option<String>,
}

/// Runs the crawl pipeline for a single reference and records metrics.
///
/// A document still `New` after the run was interrupted by cancellation.
pub async fn process_reference(
    reference: String,
    services: Arc<CrawlerServices>,
    pipeline: &PipelineExecutor<PipelineContext>,
    cancel: CancellationToken,
) -> DocumentOutcome {
    ACTIVE_WORKERS.inc();
    let processing_timer = DOCUMENT_PROCESSING_DURATION_SECONDS.start_timer();

    let span = info_span!("process_reference", reference = %reference);
    let mut ctx = PipelineContext::new(reference, services, cancel);
    pipeline.run(&mut ctx).instrument(span).await;

    let state = ctx.document.state;
    let reason = match state {
        DocumentState::New => Some("Cancelled before completion".to_string()),
        _ => ctx.reason.take(),
    };

    DOCUMENTS_PROCESSED_TOTAL.inc();
    if state.is_rejected() {
        let label = state.to_string();
        DOCUMENTS_REJECTED_TOTAL
            .with_label_values(&[label.as_str()])
            .inc();
    }
    match state {
        DocumentState::Done => debug!(reference = %ctx.reference(), "Document done"),
        DocumentState::Error => {
            DOCUMENTS_FAILED_TOTAL.inc();
            error!(
                reference = %ctx.reference(),
                reason = reason.as_deref().unwrap_or("-"),
                "Document failed"
            );
        }
        _ => debug!(
            reference = %ctx.reference(),
            %state,
            reason = reason.as_deref().unwrap_or("-"),
            "Document not committed"
        ),
    }

    processing_timer.observe_duration();
    ACTIVE_WORKERS.dec();

    DocumentOutcome {
        reference: ctx.reference().to_string(),
        state,
        reason,
    }
}

/// Per-state counts of a crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub total: usize,
    pub done: usize,
    pub rejected: usize,
    pub bad_status: usize,
    pub unsupported: usize,
    pub error: usize,
    pub incomplete: usize,
}

impl CrawlSummary {
    pub fn record(&mut self, outcome: &DocumentOutcome) {
        self.total += 1;
        match outcome.state {
            DocumentState::Done => self.done += 1,
            DocumentState::Rejected => self.rejected += 1,
            DocumentState::BadStatus => self.bad_status += 1,
            DocumentState::Unsupported => self.unsupported += 1,
            DocumentState::Error => self.error += 1,
            DocumentState::New => self.incomplete += 1,
        }
    }

    pub fn merge(&mut self, other: &CrawlSummary) {
        self.total += other.total;
        self.done += other.done;
        self.rejected += other.rejected;
        self.bad_status += other.bad_status;
        self.unsupported += other.unsupported;
        self.error += other.error;
        self.incomplete += other.incomplete;
    }
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} done={} rejected={} bad_status={} unsupported={} error={} incomplete={}",
            self.total,
            self.done,
            self.rejected,
            self.bad_status,
            self.unsupported,
            self.error,
            self.incomplete
        )
    }
}

type OutcomeCallback = Arc<dyn Fn(&DocumentOutcome) + Send + Sync>;

/// Fixed pool of workers pulling references from a shared queue.
pub struct Crawler {
    services: Arc<CrawlerServices>,
    pipeline: Arc<PipelineExecutor<PipelineContext>>,
    num_workers: usize,
    cancel: CancellationToken,
    on_outcome: Option<OutcomeCallback>,
}

impl Crawler {
    pub fn new(services: CrawlerServices, num_workers: usize) -> Self {
        Crawler {
            services: Arc::new(services),
            pipeline: Arc::new(crawler_pipeline()),
            num_workers: num_workers.max(1),
            cancel: CancellationToken::new(),
            on_outcome: None,
        }
    }

    pub fn with_pipeline(mut self, pipeline: PipelineExecutor<PipelineContext>) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    /// Called by the worker after each reference completes.
    pub fn on_outcome<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DocumentOutcome) + Send + Sync + 'static,
    {
        self.on_outcome = Some(Arc::new(callback));
        self
    }

    /// Cancelling stops workers from taking new references; in-flight
    /// documents stop at their next stage boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn services(&self) -> &Arc<CrawlerServices> {
        &self.services
    }

    #[instrument(skip_all, fields(num_workers = self.num_workers))]
    pub async fn crawl<I>(&self, references: I) -> CrawlSummary
    where
        I: IntoIterator<Item = String>,
    {
        let queue: VecDeque<String> = references.into_iter().collect();
        let queued = queue.len();
        let queue = Arc::new(Mutex::new(queue));

        self.services.fire(
            CrawlerEventKind::CrawlerStarted,
            None,
            format!(
                "Crawler started with {} workers and {} references",
                self.num_workers, queued
            ),
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.num_workers {
            let queue = queue.clone();
            let services = self.services.clone();
            let pipeline = self.pipeline.clone();
            let cancel = self.cancel.clone();
            let on_outcome = self.on_outcome.clone();
            workers.spawn(
                async move {
                    let mut summary = CrawlSummary::default();
                    loop {
                        if cancel.is_cancelled() {
                            debug!("Cancellation requested, worker stopping");
                            break;
                        }
                        let next = queue.lock().await.pop_front();
                        let Some(reference) = next else {
                            break;
                        };
                        let outcome =
                            process_reference(reference, services.clone(), &pipeline, cancel.clone())
                                .await;
                        if let Some(callback) = &on_outcome {
                            callback(&outcome);
                        }
                        summary.record(&outcome);
                    }
                    debug!(processed = summary.total, "Worker finished");
                    summary
                }
                .instrument(info_span!("worker", id = worker_id)),
            );
        }

        let mut summary = CrawlSummary::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_summary) => summary.merge(&worker_summary),
                Err(e) => error!(error = %e, "Crawler worker task failed"),
            }
        }

        let skipped = queue.lock().await.len();
        if skipped > 0 {
            warn!(skipped, "Crawl stopped with references still queued");
        }
        info!(%summary, "Crawl finished");
        self.services.fire(
            CrawlerEventKind::CrawlerFinished,
            None,
            format!("Crawler finished: {}", summary),
        );
        summary
    }
}
