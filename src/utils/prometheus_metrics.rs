// src/utils/prometheus_metrics.rs

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Gauge, Histogram,
};

pub static DOCUMENTS_PROCESSED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "crawler_documents_processed_total",
        "Total number of references taken through the crawl pipeline."
    )
    .expect("Failed to register crawler_documents_processed_total counter")
});

pub static DOCUMENTS_COMMITTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "crawler_documents_committed_total",
        "Total number of documents (including split embedded documents) sent to committers."
    )
    .expect("Failed to register crawler_documents_committed_total counter")
});

/// Documents that ended in a non-`Done` state, labelled by that state.
pub static DOCUMENTS_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "crawler_documents_rejected_total",
        "Total number of documents rejected, by final state.",
        &["state"]
    )
    .expect("Failed to register crawler_documents_rejected_total counter")
});

pub static DOCUMENTS_FAILED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "crawler_documents_failed_total",
        "Total number of documents that ended in the ERROR state."
    )
    .expect("Failed to register crawler_documents_failed_total counter")
});

pub static FETCH_RETRIES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "crawler_fetch_retries_total",
        "Total number of fetch attempts retried after a transient failure."
    )
    .expect("Failed to register crawler_fetch_retries_total counter")
});

pub static IMPORT_ERRORS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "importer_errors_total",
        "Total number of import nodes that ended in ERROR."
    )
    .expect("Failed to register importer_errors_total counter")
});

pub static DOCUMENT_PROCESSING_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "crawler_document_processing_duration_seconds",
        "Histogram of per-reference pipeline durations."
    )
    .expect("Failed to register crawler_document_processing_duration_seconds histogram")
});

pub static ACTIVE_WORKERS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "crawler_active_workers",
        "Number of crawler workers currently processing a reference."
    )
    .expect("Failed to register crawler_active_workers gauge")
});
