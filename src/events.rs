// src/events.rs

use std::fmt;

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlerEventKind {
    CrawlerStarted,
    CrawlerFinished,
    DocumentFetched,
    DocumentCommitted,
    RejectedFilter,
    RejectedBadStatus,
    RejectedUnsupported,
    RejectedRobotsMetaNoindex,
    RejectedImport,
    ImportError,
}

impl CrawlerEventKind {
    pub fn is_rejection(self) -> bool {
        matches!(
            self,
            CrawlerEventKind::RejectedFilter
                | CrawlerEventKind::RejectedBadStatus
                | CrawlerEventKind::RejectedUnsupported
                | CrawlerEventKind::RejectedRobotsMetaNoindex
                | CrawlerEventKind::RejectedImport
                | CrawlerEventKind::ImportError
        )
    }
}

impl fmt::Display for CrawlerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrawlerEventKind::CrawlerStarted => "CRAWLER_STARTED",
            CrawlerEventKind::CrawlerFinished => "CRAWLER_FINISHED",
            CrawlerEventKind::DocumentFetched => "DOCUMENT_FETCHED",
            CrawlerEventKind::DocumentCommitted => "DOCUMENT_COMMITTED",
            CrawlerEventKind::RejectedFilter => "REJECTED_FILTER",
            CrawlerEventKind::RejectedBadStatus => "REJECTED_BAD_STATUS",
            CrawlerEventKind::RejectedUnsupported => "REJECTED_UNSUPPORTED",
            CrawlerEventKind::RejectedRobotsMetaNoindex => "REJECTED_ROBOTS_META_NOINDEX",
            CrawlerEventKind::RejectedImport => "REJECTED_IMPORT",
            CrawlerEventKind::ImportError => "IMPORT_ERROR",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlerEvent {
    pub kind: CrawlerEventKind,
    pub reference: Option<String>,
    pub message: String,
}

impl CrawlerEvent {
    pub fn new(kind: CrawlerEventKind, reference: Option<&str>, message: impl Into<String>) -> Self {
        CrawlerEvent {
            kind,
            reference: reference.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Observer notified synchronously by crawler stages.
pub trait CrawlerEventListener: Send + Sync {
    fn on_event(&self, event: &CrawlerEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventListener;

impl CrawlerEventListener for LoggingEventListener {
    fn on_event(&self, event: &CrawlerEvent) {
        let reference = event.reference.as_deref().unwrap_or("-");
        if event.kind.is_rejection() {
            warn!(event = %event.kind, %reference, "{}", event.message);
        } else {
            info!(event = %event.kind, %reference, "{}", event.message);
        }
    }
}
