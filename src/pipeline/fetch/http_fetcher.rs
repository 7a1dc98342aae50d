use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method};
use tracing::debug;

use super::{FetchMethod, FetchRequest, FetchResponse, Fetcher};
use crate::data_model::{DocumentState, Metadata};
use crate::error::{FetchError, PipelineError, Result};

pub const DEFAULT_USER_AGENT: &str = concat!("docflow/", env!("CARGO_PKG_VERSION"));

/// Plain HTTP(S) fetcher. 2xx responses keep the document `New`, any other
/// status marks it `BadStatus`. Response headers become metadata.
pub struct HttpFetcher {
    client: Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(user_agent: Option<String>, request_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(t) = request_timeout {
            builder = builder.timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(HttpFetcher {
            client,
            user_agent: user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "HttpFetcher"
    }

    fn accept(&self, request: &FetchRequest) -> bool {
        let reference = request.reference.to_ascii_lowercase();
        reference.starts_with("http://") || reference.starts_with("https://")
    }

    async fn fetch(&self, request: &FetchRequest) -> std::result::Result<FetchResponse, FetchError> {
        let method = match request.method {
            FetchMethod::Get => Method::GET,
            FetchMethod::Head => Method::HEAD,
            other => {
                return Ok(FetchResponse::new(
                    DocumentState::Unsupported,
                    -1,
                    format!("HTTP method not supported: {}", other),
                ));
            }
        };
        debug!(reference = %request.reference, %method, "Fetching over HTTP");

        let response = self
            .client
            .request(method, &request.reference)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        let mut metadata = Metadata::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                metadata.add(name.as_str(), value);
            }
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let state = if status.is_success() {
            DocumentState::New
        } else {
            DocumentState::BadStatus
        };
        let mut fetched = FetchResponse::new(
            state,
            i32::from(status.as_u16()),
            status.canonical_reason().unwrap_or("Unknown status"),
        )
        .with_metadata(metadata)
        .with_user_agent(self.user_agent.clone());
        if let Some(ct) = content_type {
            fetched = fetched.with_content_type(ct);
        }

        if state == DocumentState::New && request.method == FetchMethod::Get {
            let body = response.bytes().await?;
            let stream = request
                .stream_factory
                .from_bytes(body.to_vec())
                .map_err(|e| FetchError::Other(e.to_string()))?;
            fetched = fetched.with_content(stream);
        }
        Ok(fetched)
    }
}
