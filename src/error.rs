use std::time::Duration;
use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// The Error type for pipeline operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration validation error: {0}")]
    ConfigValidationError(String),

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Fetch error for '{reference}': {source}")]
    Fetch {
        reference: String,
        source: FetchError,
    },

    #[error("Parse error for '{reference}': {message}")]
    ParseError { reference: String, message: String },

    #[error("Error in handler '{handler}': {source}")]
    HandlerError {
        handler: String,
        source: Box<PipelineError>,
    },

    #[error("External process error: {0}")]
    ExternalProcess(String),

    #[error("Commit error for '{reference}': {message}")]
    CommitError { reference: String, message: String },

    #[error("Serialization/Deserialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("YAML error: {source}")]
    YamlError {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("CSV error: {source}")]
    CsvError {
        #[from]
        source: csv::Error,
    },

    #[error("Invalid pattern: {source}")]
    RegexError {
        #[from]
        source: regex::Error,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl PipelineError {
    /// Short name of the error kind, recorded on failed import responses.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ConfigError(_) | PipelineError::ConfigValidationError(_) => {
                "ConfigError"
            }
            PipelineError::IoError { .. } => "IoError",
            PipelineError::Fetch { .. } => "FetchError",
            PipelineError::ParseError { .. } => "ParseError",
            PipelineError::HandlerError { .. } => "HandlerError",
            PipelineError::ExternalProcess(_) => "ExternalProcessError",
            PipelineError::CommitError { .. } => "CommitError",
            PipelineError::SerializationError { .. } => "SerializationError",
            PipelineError::YamlError { .. } => "YamlError",
            PipelineError::CsvError { .. } => "CsvError",
            PipelineError::RegexError { .. } => "RegexError",
            PipelineError::Unexpected(_) => "Unexpected",
        }
    }
}

/// Failures raised by fetchers.
///
/// `Network` and `Timeout` are transient and retried by the fetch
/// coordinator; everything else ends the fetch immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error (status {status_code}): {reason}")]
    Protocol { status_code: i32, reason: String },

    #[error("unsupported request: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Timeout(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(Duration::ZERO)
        } else if err.is_connect() || err.is_request() || err.is_body() {
            FetchError::Network(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Protocol {
                status_code: i32::from(status.as_u16()),
                reason: err.to_string(),
            }
        } else {
            FetchError::Other(err.to_string())
        }
    }
}
