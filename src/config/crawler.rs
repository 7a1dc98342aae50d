// src/config/crawler.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::pipeline::fetch::{FetchMethod, RetryPolicy};
use crate::pipeline::importer::{EmbeddedPolicy, DEFAULT_MAX_EMBEDDED_DEPTH};
use crate::utils::stream::{CachedStreamFactory, DEFAULT_SPILL_THRESHOLD};

use super::pipeline::ComponentParams;

/// A pluggable component entry: `{type: <Name>, ...params}`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ComponentConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: serde_yaml::Mapping,
}

impl ComponentConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        ComponentConfig {
            kind: kind.into(),
            params: serde_yaml::Mapping::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.params.insert(serde_yaml::Value::from(key), value.into());
        self
    }

    /// Deserializes and validates this entry's parameters.
    pub fn params<P: ComponentParams + DeserializeOwned>(&self) -> Result<P> {
        let params: P = serde_yaml::from_value(serde_yaml::Value::Mapping(self.params.clone()))
            .map_err(|e| {
                PipelineError::ConfigError(format!("Invalid parameters for '{}': {}", self.kind, e))
            })?;
        params.validate()?;
        Ok(params)
    }
}

fn default_num_workers() -> usize {
    4
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_fetch_timeout_secs() -> Option<u64> {
    Some(30)
}

fn default_spill_threshold() -> usize {
    DEFAULT_SPILL_THRESHOLD
}

fn default_fetchers() -> Vec<ComponentConfig> {
    vec![
        ComponentConfig::new("HttpFetcher"),
        ComponentConfig::new("FileFetcher"),
    ]
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CrawlerSettings {
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default)]
    pub fetch_method: FetchMethod,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// `null` disables the per-attempt timeout.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(default = "default_spill_threshold")]
    pub spill_threshold_bytes: usize,
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub ignore_robots_meta: bool,
    #[serde(default = "default_fetchers")]
    pub fetchers: Vec<ComponentConfig>,
    #[serde(default)]
    pub reference_filters: Vec<ComponentConfig>,
    #[serde(default)]
    pub metadata_filters: Vec<ComponentConfig>,
    #[serde(default)]
    pub document_filters: Vec<ComponentConfig>,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        CrawlerSettings {
            num_workers: default_num_workers(),
            fetch_method: FetchMethod::default(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            spill_threshold_bytes: default_spill_threshold(),
            temp_dir: None,
            ignore_robots_meta: false,
            fetchers: default_fetchers(),
            reference_filters: Vec::new(),
            metadata_filters: Vec::new(),
            document_filters: Vec::new(),
        }
    }
}

impl CrawlerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(PipelineError::ConfigValidationError(
                "CrawlerSettings: num_workers must be greater than 0".to_string(),
            ));
        }
        if self.fetch_timeout_secs == Some(0) {
            return Err(PipelineError::ConfigValidationError(
                "CrawlerSettings: fetch_timeout_secs must be greater than 0 (or null for no timeout)"
                    .to_string(),
            ));
        }
        if self.spill_threshold_bytes == 0 {
            return Err(PipelineError::ConfigValidationError(
                "CrawlerSettings: spill_threshold_bytes must be greater than 0".to_string(),
            ));
        }
        if self.fetchers.is_empty() {
            return Err(PipelineError::ConfigValidationError(
                "CrawlerSettings: at least one fetcher must be configured".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            fetch_timeout: self.fetch_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn stream_factory(&self) -> CachedStreamFactory {
        CachedStreamFactory::new(self.spill_threshold_bytes, self.temp_dir.clone())
    }
}

fn default_max_embedded_depth() -> usize {
    DEFAULT_MAX_EMBEDDED_DEPTH
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ImporterSettings {
    /// Content type assumed when neither the fetch nor the caller set one.
    #[serde(default)]
    pub default_content_type: Option<String>,
    #[serde(default = "default_max_embedded_depth")]
    pub max_embedded_depth: usize,
    #[serde(default)]
    pub errors_save_dir: Option<PathBuf>,
    #[serde(default)]
    pub embedded: EmbeddedPolicy,
    #[serde(default)]
    pub pre_parse_handlers: Vec<ComponentConfig>,
    #[serde(default)]
    pub post_parse_handlers: Vec<ComponentConfig>,
}

impl Default for ImporterSettings {
    fn default() -> Self {
        ImporterSettings {
            default_content_type: None,
            max_embedded_depth: default_max_embedded_depth(),
            errors_save_dir: None,
            embedded: EmbeddedPolicy::default(),
            pre_parse_handlers: Vec::new(),
            post_parse_handlers: Vec::new(),
        }
    }
}

impl ImporterSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_embedded_depth == 0 {
            return Err(PipelineError::ConfigValidationError(
                "ImporterSettings: max_embedded_depth must be greater than 0".to_string(),
            ));
        }
        if let Some(ct) = &self.default_content_type {
            if !ct.contains('/') {
                return Err(PipelineError::ConfigValidationError(format!(
                    "ImporterSettings: default_content_type '{}' is not a valid content type",
                    ct
                )));
            }
        }
        Ok(())
    }
}

/// Complete configuration of a crawl, read from YAML.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CrawlerConfig {
    #[serde(default)]
    pub crawler: CrawlerSettings,
    #[serde(default)]
    pub importer: ImporterSettings,
    #[serde(default)]
    pub committers: Vec<ComponentConfig>,
}

impl CrawlerConfig {
    pub fn validate(&self) -> Result<()> {
        self.crawler.validate()?;
        self.importer.validate()?;
        Ok(())
    }
}
