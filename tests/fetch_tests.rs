use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docflow::data_model::DocumentState;
use docflow::error::FetchError;
use docflow::pipeline::fetch::{
    FetchCoordinator, FetchMethod, FetchRequest, FetchResponse, Fetcher, FileFetcher, HttpFetcher,
    RetryPolicy,
};
use tempfile::tempdir;

/// Fails with the queued errors (last first) and then succeeds.
struct ScriptedFetcher {
    name: &'static str,
    accepts: bool,
    failures: Mutex<Vec<FetchError>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(name: &'static str, failures: Vec<FetchError>) -> Self {
        ScriptedFetcher {
            name,
            accepts: true,
            failures: Mutex::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    fn refusing(name: &'static str) -> Self {
        ScriptedFetcher {
            accepts: false,
            ..ScriptedFetcher::new(name, Vec::new())
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    fn name(&self) -> &'static str {
        self.name
    }

    fn accept(&self, _request: &FetchRequest) -> bool {
        self.accepts
    }

    async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.failures.lock().unwrap().pop();
        match next {
            Some(err) => Err(err),
            None => Ok(FetchResponse::new(DocumentState::New, 200, "OK")),
        }
    }
}

struct SlowFetcher;

#[async_trait]
impl Fetcher for SlowFetcher {
    fn name(&self) -> &'static str {
        "SlowFetcher"
    }

    fn accept(&self, _request: &FetchRequest) -> bool {
        true
    }

    async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(FetchResponse::new(DocumentState::New, 200, "OK"))
    }
}

fn quick_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        retry_delay: Duration::from_millis(1),
        fetch_timeout: Some(Duration::from_secs(5)),
    }
}

fn network(msg: &str) -> FetchError {
    FetchError::Network(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let fetcher = Arc::new(ScriptedFetcher::new(
            "Flaky",
            vec![network("reset"), network("refused")],
        ));
        let coordinator = FetchCoordinator::new(vec![fetcher.clone()], quick_policy(2));

        let response = coordinator
            .fetch(&FetchRequest::new("http://x.com/a", FetchMethod::Get))
            .await;
        assert_eq!(response.state, DocumentState::New);
        assert_eq!(response.status_code, 200);
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fall_back_to_next_fetcher() {
        let first = Arc::new(ScriptedFetcher::new(
            "First",
            vec![network("a"), network("b"), network("c")],
        ));
        let second = Arc::new(ScriptedFetcher::new("Second", Vec::new()));
        let coordinator =
            FetchCoordinator::new(vec![first.clone(), second.clone()], quick_policy(1));

        let response = coordinator
            .fetch(&FetchRequest::new("http://x.com/a", FetchMethod::Get))
            .await;
        assert_eq!(response.state, DocumentState::New);
        assert_eq!(first.calls(), 2);
        assert_eq!(second.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_fetchers_exhausted_is_error() {
        let only = Arc::new(ScriptedFetcher::new("Only", vec![network("down"), network("down")]));
        let coordinator = FetchCoordinator::new(vec![only.clone()], quick_policy(1));

        let response = coordinator
            .fetch(&FetchRequest::new("http://x.com/a", FetchMethod::Get))
            .await;
        assert_eq!(response.state, DocumentState::Error);
        assert_eq!(response.status_code, -1);
        assert!(response.reason.contains("Only"));
        assert!(response.reason.contains("down"));
    }

    #[tokio::test]
    async fn test_terminal_failures_map_to_states() {
        let protocol = Arc::new(ScriptedFetcher::new(
            "Proto",
            vec![FetchError::Protocol {
                status_code: 503,
                reason: "Service Unavailable".to_string(),
            }],
        ));
        let backup = Arc::new(ScriptedFetcher::new("Backup", Vec::new()));
        let coordinator =
            FetchCoordinator::new(vec![protocol.clone(), backup.clone()], quick_policy(3));
        let response = coordinator
            .fetch(&FetchRequest::new("http://x.com/a", FetchMethod::Get))
            .await;
        assert_eq!(response.state, DocumentState::BadStatus);
        assert_eq!(response.status_code, 503);
        assert_eq!(response.reason, "Service Unavailable");
        assert_eq!(protocol.calls(), 1);
        assert_eq!(backup.calls(), 0);

        let unsupported = Arc::new(ScriptedFetcher::new(
            "Picky",
            vec![FetchError::Unsupported("no such scheme".to_string())],
        ));
        let coordinator = FetchCoordinator::new(vec![unsupported], quick_policy(3));
        let response = coordinator
            .fetch(&FetchRequest::new("gopher://x", FetchMethod::Get))
            .await;
        assert_eq!(response.state, DocumentState::Unsupported);
        assert_eq!(response.reason, "no such scheme");
    }

    #[tokio::test]
    async fn test_no_accepting_fetcher_is_unsupported() {
        let refusing = Arc::new(ScriptedFetcher::refusing("Refusing"));
        let coordinator = FetchCoordinator::new(vec![refusing.clone()], quick_policy(0));

        let response = coordinator
            .fetch(&FetchRequest::new("ftp://x.com/a", FetchMethod::Get))
            .await;
        assert_eq!(response.state, DocumentState::Unsupported);
        assert_eq!(response.status_code, -1);
        assert!(response.reason.contains("No fetcher accepted reference"));
        assert_eq!(refusing.calls(), 0);
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out() {
        let policy = RetryPolicy {
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
            fetch_timeout: Some(Duration::from_millis(50)),
        };
        let coordinator = FetchCoordinator::new(vec![Arc::new(SlowFetcher)], policy);

        let started = std::time::Instant::now();
        let response = coordinator
            .fetch(&FetchRequest::new("http://slow", FetchMethod::Get))
            .await;
        assert_eq!(response.state, DocumentState::Error);
        assert!(response.reason.contains("SlowFetcher"));
        assert!(response.reason.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_file_fetcher_reads_local_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("page.txt");
        std::fs::write(&path, "local content").unwrap();

        let fetcher = FileFetcher::new();
        let request = FetchRequest::new(path.to_string_lossy(), FetchMethod::Get);
        assert!(fetcher.accept(&request));

        let response = fetcher.fetch(&request).await.unwrap();
        assert_eq!(response.state, DocumentState::New);
        assert_eq!(response.status_code, 200);
        assert_eq!(response.metadata.get("Content-Length"), Some("13"));
        assert!(response.metadata.contains_key("Last-Modified"));
        let mut content = response.content.unwrap();
        assert_eq!(content.read_all_string().unwrap(), "local content");

        let head = fetcher
            .fetch(&FetchRequest::new(path.to_string_lossy(), FetchMethod::Head))
            .await
            .unwrap();
        assert_eq!(head.state, DocumentState::New);
        assert!(head.content.is_none());
    }

    #[tokio::test]
    async fn test_file_fetcher_missing_file_and_post() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        let fetcher = FileFetcher::new();

        let response = fetcher
            .fetch(&FetchRequest::new(missing.to_string_lossy(), FetchMethod::Get))
            .await
            .unwrap();
        assert_eq!(response.state, DocumentState::BadStatus);
        assert_eq!(response.status_code, 404);

        let post = fetcher
            .fetch(&FetchRequest::new(missing.to_string_lossy(), FetchMethod::Post))
            .await;
        assert!(matches!(post, Err(FetchError::Unsupported(_))));

        // Through the coordinator the same request ends up Unsupported
        let coordinator = FetchCoordinator::new(vec![Arc::new(fetcher)], quick_policy(0));
        let response = coordinator
            .fetch(&FetchRequest::new(missing.to_string_lossy(), FetchMethod::Post))
            .await;
        assert_eq!(response.state, DocumentState::Unsupported);
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_post() {
        let fetcher = HttpFetcher::new(Some("test-agent".to_string()), None).unwrap();
        assert_eq!(fetcher.user_agent(), "test-agent");

        let request = FetchRequest::new("http://localhost:1/form", FetchMethod::Post);
        assert!(fetcher.accept(&request));
        assert!(!fetcher.accept(&FetchRequest::new("/local/path", FetchMethod::Get)));

        let response = fetcher.fetch(&request).await.unwrap();
        assert_eq!(response.state, DocumentState::Unsupported);
        assert_eq!(response.reason, "HTTP method not supported: POST");
    }
}
