use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use tracing::debug;

use super::{FetchMethod, FetchRequest, FetchResponse, Fetcher};
use crate::data_model::{DocumentState, Metadata};
use crate::error::FetchError;

/// Reads local files, addressed either by `file:` URL or by plain path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileFetcher;

impl FileFetcher {
    pub fn new() -> Self {
        FileFetcher
    }

    fn resolve_path(reference: &str) -> Result<PathBuf, FetchError> {
        if reference.starts_with("file:") {
            let url = Url::parse(reference)
                .map_err(|e| FetchError::Unsupported(format!("Invalid file URL: {}", e)))?;
            url.to_file_path().map_err(|_| {
                FetchError::Unsupported(format!("Not a local file URL: {}", reference))
            })
        } else {
            Ok(PathBuf::from(reference))
        }
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    fn name(&self) -> &'static str {
        "FileFetcher"
    }

    fn accept(&self, request: &FetchRequest) -> bool {
        request.reference.starts_with("file:") || !request.reference.contains("://")
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        if request.method == FetchMethod::Post {
            return Err(FetchError::Unsupported(format!(
                "Method {} not supported for local files",
                request.method
            )));
        }
        let path = FileFetcher::resolve_path(&request.reference)?;
        debug!(path = %path.display(), "Fetching local file");

        let file_meta = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(FetchResponse::new(
                    DocumentState::BadStatus,
                    404,
                    format!("File not found: {}", path.display()),
                ));
            }
            Err(e) => return Err(FetchError::Other(e.to_string())),
        };
        if !file_meta.is_file() {
            return Err(FetchError::Unsupported(format!(
                "Not a regular file: {}",
                path.display()
            )));
        }

        let mut metadata = Metadata::new();
        metadata.set("Content-Length", file_meta.len().to_string());
        if let Ok(modified) = file_meta.modified() {
            let modified: DateTime<Utc> = modified.into();
            metadata.set("Last-Modified", modified.to_rfc3339());
        }

        let mut response =
            FetchResponse::new(DocumentState::New, 200, "OK").with_metadata(metadata);
        if request.method == FetchMethod::Get {
            let factory = request.stream_factory.clone();
            let stream = tokio::task::spawn_blocking(move || {
                let file = std::fs::File::open(&path)?;
                factory.from_reader(file)
            })
            .await
            .map_err(|e| FetchError::Other(e.to_string()))?
            .map_err(|e| FetchError::Other(e.to_string()))?;
            response = response.with_content(stream);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_paths_and_file_urls() {
        let fetcher = FileFetcher::new();
        assert!(fetcher.accept(&FetchRequest::new("/tmp/a.txt", FetchMethod::Get)));
        assert!(fetcher.accept(&FetchRequest::new("file:///tmp/a.txt", FetchMethod::Get)));
        assert!(!fetcher.accept(&FetchRequest::new("http://x.com/a", FetchMethod::Get)));
    }
}
