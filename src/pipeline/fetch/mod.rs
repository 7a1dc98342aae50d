// src/pipeline/fetch/mod.rs

mod file_fetcher;
mod http_fetcher;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, warn};

use crate::data_model::{DocumentState, Metadata};
use crate::error::FetchError;
use crate::utils::prometheus_metrics::FETCH_RETRIES_TOTAL;
use crate::utils::stream::{CachedStream, CachedStreamFactory};

pub use file_fetcher::FileFetcher;
pub use http_fetcher::HttpFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FetchMethod {
    #[default]
    Get,
    Head,
    Post,
}

impl std::fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchMethod::Get => f.write_str("GET"),
            FetchMethod::Head => f.write_str("HEAD"),
            FetchMethod::Post => f.write_str("POST"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub reference: String,
    pub method: FetchMethod,
    pub stream_factory: CachedStreamFactory,
}

impl FetchRequest {
    pub fn new(reference: impl Into<String>, method: FetchMethod) -> Self {
        FetchRequest {
            reference: reference.into(),
            method,
            stream_factory: CachedStreamFactory::default(),
        }
    }

    pub fn with_stream_factory(mut self, stream_factory: CachedStreamFactory) -> Self {
        self.stream_factory = stream_factory;
        self
    }
}

/// Result of a fetch. `state` is always set, including on failure.
#[derive(Debug)]
pub struct FetchResponse {
    pub state: DocumentState,
    /// Transport status code, -1 when unknown.
    pub status_code: i32,
    pub reason: String,
    pub user_agent: Option<String>,
    pub content: Option<CachedStream>,
    pub metadata: Metadata,
    pub content_type: Option<String>,
}

impl FetchResponse {
    pub fn new(state: DocumentState, status_code: i32, reason: impl Into<String>) -> Self {
        FetchResponse {
            state,
            status_code,
            reason: reason.into(),
            user_agent: None,
            content: None,
            metadata: Metadata::new(),
            content_type: None,
        }
    }

    pub fn with_content(mut self, content: CachedStream) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn accept(&self, request: &FetchRequest) -> bool;

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Upper bound for a single fetch attempt. `None` means unbounded.
    pub fetch_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
            fetch_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Picks the first fetcher accepting a request and maps its outcome to a
/// [`DocumentState`]. Transient failures are retried on the same fetcher
/// before moving on to the next accepting one.
pub struct FetchCoordinator {
    fetchers: Vec<Arc<dyn Fetcher>>,
    policy: RetryPolicy,
}

impl FetchCoordinator {
    pub fn new(fetchers: Vec<Arc<dyn Fetcher>>, policy: RetryPolicy) -> Self {
        if fetchers.is_empty() {
            warn!("Fetch coordinator created with no fetchers; every reference will be unsupported.");
        }
        FetchCoordinator { fetchers, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[instrument(skip(self, request), fields(reference = %request.reference))]
    pub async fn fetch(&self, request: &FetchRequest) -> FetchResponse {
        let mut accepted_any = false;
        let mut last_failure: Option<String> = None;

        for fetcher in self.fetchers.iter().filter(|f| f.accept(request)) {
            accepted_any = true;
            let mut attempt: u32 = 0;
            loop {
                match self.attempt(fetcher.as_ref(), request).await {
                    Ok(response) => {
                        debug!(
                            fetcher = fetcher.name(),
                            state = %response.state,
                            status_code = response.status_code,
                            "Fetch completed"
                        );
                        return response;
                    }
                    Err(err) if err.is_retryable() => {
                        if attempt < self.policy.max_retries {
                            attempt += 1;
                            FETCH_RETRIES_TOTAL.inc();
                            warn!(
                                fetcher = fetcher.name(),
                                attempt,
                                error = %err,
                                "Transient fetch failure, retrying"
                            );
                            sleep(self.policy.retry_delay).await;
                            continue;
                        }
                        warn!(
                            fetcher = fetcher.name(),
                            error = %err,
                            "Retries exhausted, trying next fetcher"
                        );
                        last_failure = Some(format!("{}: {}", fetcher.name(), err));
                        break;
                    }
                    Err(err) => {
                        warn!(fetcher = fetcher.name(), error = %err, "Terminal fetch failure");
                        return terminal_response(fetcher.name(), err);
                    }
                }
            }
        }

        if !accepted_any {
            return FetchResponse::new(
                DocumentState::Unsupported,
                -1,
                format!("No fetcher accepted reference '{}'", request.reference),
            );
        }
        FetchResponse::new(
            DocumentState::Error,
            -1,
            last_failure.unwrap_or_else(|| "All fetchers failed".to_string()),
        )
    }

    async fn attempt(
        &self,
        fetcher: &dyn Fetcher,
        request: &FetchRequest,
    ) -> Result<FetchResponse, FetchError> {
        match self.policy.fetch_timeout {
            Some(limit) => match timeout(limit, fetcher.fetch(request)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(limit)),
            },
            None => fetcher.fetch(request).await,
        }
    }
}

fn terminal_response(fetcher: &str, err: FetchError) -> FetchResponse {
    match err {
        FetchError::Protocol {
            status_code,
            reason,
        } => FetchResponse::new(DocumentState::BadStatus, status_code, reason),
        FetchError::Unsupported(reason) => {
            FetchResponse::new(DocumentState::Unsupported, -1, reason)
        }
        other => FetchResponse::new(DocumentState::Error, -1, format!("{}: {}", fetcher, other)),
    }
}
