// src/config/pipeline.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::data_model::{Metadata, OnSet};
use crate::error::{PipelineError, Result};
use crate::pipeline::filters::OnMatch;
use crate::pipeline::handlers::external::{FieldSource, MetadataFormat};
use crate::utils::text_matcher::TextMatcher;

/// Parameters of a configurable component.
pub trait ComponentParams: DeserializeOwned {
    fn validate(&self) -> Result<()>;
}

fn invalid(component: &str, message: &str) -> PipelineError {
    PipelineError::ConfigValidationError(format!("{}: {}", component, message))
}

// --- Fetchers ---

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileFetcherParams {}

impl ComponentParams for FileFetcherParams {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HttpFetcherParams {
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl ComponentParams for HttpFetcherParams {
    fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == Some(0) {
            return Err(invalid("HttpFetcherParams", "request_timeout_secs must be greater than 0"));
        }
        if self.user_agent.as_deref().is_some_and(|ua| ua.trim().is_empty()) {
            return Err(invalid("HttpFetcherParams", "user_agent must not be blank"));
        }
        Ok(())
    }
}

// --- Filters ---

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExtensionReferenceFilterParams {
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub on_match: OnMatch,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl ComponentParams for ExtensionReferenceFilterParams {
    fn validate(&self) -> Result<()> {
        if self.extensions.iter().any(|e| e.trim().trim_start_matches('.').is_empty()) {
            return Err(invalid(
                "ExtensionReferenceFilterParams",
                "extensions must not contain empty entries",
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RegexReferenceFilterParams {
    pub pattern: TextMatcher,
    #[serde(default)]
    pub on_match: OnMatch,
}

impl ComponentParams for RegexReferenceFilterParams {
    fn validate(&self) -> Result<()> {
        if self.pattern.pattern().is_empty() {
            return Err(invalid("RegexReferenceFilterParams", "pattern must not be empty"));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RegexMetadataFilterParams {
    pub field: String,
    pub pattern: TextMatcher,
    #[serde(default)]
    pub on_match: OnMatch,
}

impl ComponentParams for RegexMetadataFilterParams {
    fn validate(&self) -> Result<()> {
        if self.field.trim().is_empty() {
            return Err(invalid("RegexMetadataFilterParams", "field must not be empty"));
        }
        Ok(())
    }
}

// --- Handlers ---

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConstantTaggerParams {
    pub constants: Metadata,
    #[serde(default)]
    pub on_set: OnSet,
}

impl ComponentParams for ConstantTaggerParams {
    fn validate(&self) -> Result<()> {
        if self.constants.is_empty() {
            return Err(invalid("ConstantTaggerParams", "constants must not be empty"));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TextFilterParams {
    /// Field to test; the content is tested when absent.
    #[serde(default)]
    pub field: Option<String>,
    pub pattern: TextMatcher,
    #[serde(default)]
    pub on_match: OnMatch,
}

impl ComponentParams for TextFilterParams {
    fn validate(&self) -> Result<()> {
        if self.field.as_deref().is_some_and(|f| f.trim().is_empty()) {
            return Err(invalid("TextFilterParams", "field must not be blank"));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RegexReplaceParams {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
    #[serde(default)]
    pub field: Option<String>,
}

impl ComponentParams for RegexReplaceParams {
    fn validate(&self) -> Result<()> {
        if self.pattern.is_empty() {
            return Err(invalid("RegexReplaceParams", "pattern must not be empty"));
        }
        regex::Regex::new(&self.pattern)
            .map_err(|e| invalid("RegexReplaceParams", &format!("invalid pattern: {}", e)))?;
        Ok(())
    }
}

fn default_max_samples() -> usize {
    3
}

fn default_truncate_samples_at() -> Option<usize> {
    Some(100)
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FieldReportTaggerParams {
    pub file: PathBuf,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_truncate_samples_at")]
    pub truncate_samples_at: Option<usize>,
    #[serde(default)]
    pub with_headers: bool,
    #[serde(default)]
    pub with_occurrences: bool,
}

impl ComponentParams for FieldReportTaggerParams {
    fn validate(&self) -> Result<()> {
        if self.file.as_os_str().is_empty() {
            return Err(invalid("FieldReportTaggerParams", "file must be set"));
        }
        if self.truncate_samples_at == Some(0) {
            return Err(invalid(
                "FieldReportTaggerParams",
                "truncate_samples_at must be greater than 0 (or null to keep samples whole)",
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExtractionRuleParams {
    pub pattern: String,
    pub field: FieldSource,
    #[serde(default)]
    pub value_group: Option<usize>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExternalProcessParams {
    pub command: String,
    #[serde(default)]
    pub extraction_rules: Vec<ExtractionRuleParams>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata_input_format: MetadataFormat,
    #[serde(default)]
    pub metadata_output_format: MetadataFormat,
    #[serde(default)]
    pub on_set: OnSet,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub ignore_exit_code: bool,
    #[serde(default)]
    pub tag_only: bool,
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl ComponentParams for ExternalProcessParams {
    fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(invalid("ExternalProcessParams", "command must not be empty"));
        }
        if self.timeout_secs == Some(0) {
            return Err(invalid("ExternalProcessParams", "timeout_secs must be greater than 0"));
        }
        for rule in &self.extraction_rules {
            regex::Regex::new(&rule.pattern).map_err(|e| {
                invalid(
                    "ExternalProcessParams",
                    &format!("invalid extraction pattern '{}': {}", rule.pattern, e),
                )
            })?;
            if let FieldSource::Name(name) = &rule.field {
                if name.trim().is_empty() {
                    return Err(invalid("ExternalProcessParams", "extraction field name must not be empty"));
                }
            }
        }
        Ok(())
    }
}

// --- Committers ---

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MemoryCommitterParams {}

impl ComponentParams for MemoryCommitterParams {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct JsonLinesCommitterParams {
    pub path: PathBuf,
}

impl ComponentParams for JsonLinesCommitterParams {
    fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(invalid("JsonLinesCommitterParams", "path must be set"));
        }
        Ok(())
    }
}
