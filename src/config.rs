// src/config.rs
use crate::error::{PipelineError, Result};
use std::fs;
use std::path::Path;

pub mod crawler;
pub mod importer;
pub mod pipeline;
pub mod worker;

pub use crawler::{ComponentConfig, CrawlerConfig, CrawlerSettings, ImporterSettings};

/// Loads, parses and validates the crawler configuration YAML file.
pub fn load_crawler_config<P: AsRef<Path>>(config_path: P) -> Result<CrawlerConfig> {
    let path_ref = config_path.as_ref();
    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        PipelineError::ConfigError(format!(
            "Failed to read crawler config file '{}': {}",
            path_ref.display(),
            e
        ))
    })?;

    let config = parse_crawler_config(&config_content).map_err(|e| match e {
        PipelineError::ConfigError(msg) => PipelineError::ConfigError(format!(
            "Failed to parse crawler config YAML from '{}': {}",
            path_ref.display(),
            msg
        )),
        other => other,
    })?;
    Ok(config)
}

/// Parses and validates crawler configuration from a YAML string.
pub fn parse_crawler_config(yaml: &str) -> Result<CrawlerConfig> {
    let config: CrawlerConfig =
        serde_yaml::from_str(yaml).map_err(|e| PipelineError::ConfigError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
