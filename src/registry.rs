// src/registry.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::pipeline::{
    ConstantTaggerParams, ExtensionReferenceFilterParams, ExternalProcessParams,
    FieldReportTaggerParams, FileFetcherParams, HttpFetcherParams, JsonLinesCommitterParams,
    MemoryCommitterParams, RegexMetadataFilterParams, RegexReferenceFilterParams,
    RegexReplaceParams, TextFilterParams,
};
use crate::config::ComponentConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::committer::{Committer, JsonLinesCommitter, MemoryCommitter};
use crate::pipeline::fetch::{FileFetcher, Fetcher, HttpFetcher};
use crate::pipeline::filters::{
    ExtensionReferenceFilter, Filter, RegexMetadataFilter, RegexReferenceFilter,
};
use crate::pipeline::handlers::external::ExtractionRule;
use crate::pipeline::handlers::{
    ConstantTagger, DocumentHandler, ExternalProcessHandler, FieldReportTagger,
    RegexReplaceTransformer, TextFilter,
};

pub type FetcherFactory = Box<dyn Fn(&ComponentConfig) -> Result<Arc<dyn Fetcher>> + Send + Sync>;
pub type FilterFactory = Box<dyn Fn(&ComponentConfig) -> Result<Arc<dyn Filter>> + Send + Sync>;
pub type HandlerFactory =
    Box<dyn Fn(&ComponentConfig) -> Result<Arc<dyn DocumentHandler>> + Send + Sync>;
pub type CommitterFactory =
    Box<dyn Fn(&ComponentConfig) -> Result<Arc<dyn Committer>> + Send + Sync>;

/// Maps the `type` of a configuration entry to the factory that builds it.
///
/// `with_builtins` knows every component shipped with the crate; callers
/// register their own types on top.
pub struct ComponentRegistry {
    fetchers: HashMap<String, FetcherFactory>,
    filters: HashMap<String, FilterFactory>,
    handlers: HashMap<String, HandlerFactory>,
    committers: HashMap<String, CommitterFactory>,
}

fn unknown(category: &str, kind: &str) -> PipelineError {
    PipelineError::ConfigError(format!("Unknown {} type: '{}'", category, kind))
}

impl ComponentRegistry {
    pub fn empty() -> Self {
        ComponentRegistry {
            fetchers: HashMap::new(),
            filters: HashMap::new(),
            handlers: HashMap::new(),
            committers: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = ComponentRegistry::empty();

        registry.register_fetcher("FileFetcher", |entry| {
            entry.params::<FileFetcherParams>()?;
            Ok(Arc::new(FileFetcher::new()))
        });
        registry.register_fetcher("HttpFetcher", |entry| {
            let params: HttpFetcherParams = entry.params()?;
            let fetcher = HttpFetcher::new(
                params.user_agent,
                params.request_timeout_secs.map(Duration::from_secs),
            )?;
            Ok(Arc::new(fetcher))
        });

        registry.register_filter("ExtensionReferenceFilter", |entry| {
            let params: ExtensionReferenceFilterParams = entry.params()?;
            Ok(Arc::new(ExtensionReferenceFilter::new(
                params.extensions,
                params.on_match,
                params.case_sensitive,
            )))
        });
        registry.register_filter("RegexReferenceFilter", |entry| {
            let params: RegexReferenceFilterParams = entry.params()?;
            Ok(Arc::new(RegexReferenceFilter::new(params.pattern, params.on_match)))
        });
        registry.register_filter("RegexMetadataFilter", |entry| {
            let params: RegexMetadataFilterParams = entry.params()?;
            Ok(Arc::new(RegexMetadataFilter::new(
                params.field,
                params.pattern,
                params.on_match,
            )))
        });

        registry.register_handler("ConstantTagger", |entry| {
            let params: ConstantTaggerParams = entry.params()?;
            let constants = params
                .constants
                .iter()
                .map(|(field, values)| (field.to_string(), values.to_vec()))
                .collect();
            Ok(Arc::new(ConstantTagger::new(constants, params.on_set)))
        });
        registry.register_handler("TextFilter", |entry| {
            let params: TextFilterParams = entry.params()?;
            let filter = match params.field {
                Some(field) => TextFilter::on_field(field, params.pattern, params.on_match),
                None => TextFilter::on_content(params.pattern, params.on_match),
            };
            Ok(Arc::new(filter))
        });
        registry.register_handler("RegexReplaceTransformer", |entry| {
            let params: RegexReplaceParams = entry.params()?;
            let mut transformer = RegexReplaceTransformer::new(&params.pattern, params.replacement)?;
            if let Some(field) = params.field {
                transformer = transformer.on_field(field);
            }
            Ok(Arc::new(transformer))
        });
        registry.register_handler("FieldReportTagger", |entry| {
            let params: FieldReportTaggerParams = entry.params()?;
            Ok(Arc::new(
                FieldReportTagger::new(params.file)
                    .with_max_samples(params.max_samples)
                    .with_truncate_samples_at(params.truncate_samples_at)
                    .with_headers(params.with_headers)
                    .with_occurrences(params.with_occurrences),
            ))
        });
        registry.register_handler("ExternalProcessHandler", |entry| {
            let params: ExternalProcessParams = entry.params()?;
            let rules = params
                .extraction_rules
                .into_iter()
                .map(|rule| ExtractionRule::new(&rule.pattern, rule.field, rule.value_group))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let handler = ExternalProcessHandler::new(params.command)?
                .with_extraction_rules(rules)
                .with_env(params.env)
                .with_metadata_formats(params.metadata_input_format, params.metadata_output_format)
                .with_on_set(params.on_set)
                .with_timeout(params.timeout_secs.map(Duration::from_secs))
                .ignore_exit_code(params.ignore_exit_code)
                .tag_only(params.tag_only)
                .with_temp_dir(params.temp_dir);
            Ok(Arc::new(handler))
        });

        registry.register_committer("MemoryCommitter", |entry| {
            entry.params::<MemoryCommitterParams>()?;
            Ok(Arc::new(MemoryCommitter::new()))
        });
        registry.register_committer("JsonLinesCommitter", |entry| {
            let params: JsonLinesCommitterParams = entry.params()?;
            Ok(Arc::new(JsonLinesCommitter::new(params.path)))
        });

        registry
    }

    pub fn register_fetcher<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ComponentConfig) -> Result<Arc<dyn Fetcher>> + Send + Sync + 'static,
    {
        self.fetchers.insert(kind.to_string(), Box::new(factory));
    }

    pub fn register_filter<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ComponentConfig) -> Result<Arc<dyn Filter>> + Send + Sync + 'static,
    {
        self.filters.insert(kind.to_string(), Box::new(factory));
    }

    pub fn register_handler<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ComponentConfig) -> Result<Arc<dyn DocumentHandler>> + Send + Sync + 'static,
    {
        self.handlers.insert(kind.to_string(), Box::new(factory));
    }

    pub fn register_committer<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ComponentConfig) -> Result<Arc<dyn Committer>> + Send + Sync + 'static,
    {
        self.committers.insert(kind.to_string(), Box::new(factory));
    }

    pub fn build_fetcher(&self, entry: &ComponentConfig) -> Result<Arc<dyn Fetcher>> {
        debug!(kind = %entry.kind, "Building fetcher");
        let factory = self
            .fetchers
            .get(&entry.kind)
            .ok_or_else(|| unknown("fetcher", &entry.kind))?;
        factory(entry)
    }

    pub fn build_filter(&self, entry: &ComponentConfig) -> Result<Arc<dyn Filter>> {
        debug!(kind = %entry.kind, "Building filter");
        let factory = self
            .filters
            .get(&entry.kind)
            .ok_or_else(|| unknown("filter", &entry.kind))?;
        factory(entry)
    }

    pub fn build_handler(&self, entry: &ComponentConfig) -> Result<Arc<dyn DocumentHandler>> {
        debug!(kind = %entry.kind, "Building handler");
        let factory = self
            .handlers
            .get(&entry.kind)
            .ok_or_else(|| unknown("handler", &entry.kind))?;
        factory(entry)
    }

    pub fn build_committer(&self, entry: &ComponentConfig) -> Result<Arc<dyn Committer>> {
        debug!(kind = %entry.kind, "Building committer");
        let factory = self
            .committers
            .get(&entry.kind)
            .ok_or_else(|| unknown("committer", &entry.kind))?;
        factory(entry)
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        ComponentRegistry::with_builtins()
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<&str> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("fetchers", &sorted_keys(&self.fetchers))
            .field("filters", &sorted_keys(&self.filters))
            .field("handlers", &sorted_keys(&self.handlers))
            .field("committers", &sorted_keys(&self.committers))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::{Document, ParseState};
    use crate::pipeline::filters::FilterTarget;

    #[test]
    fn test_unknown_type_is_config_error() {
        let registry = ComponentRegistry::with_builtins();
        let result = registry.build_filter(&ComponentConfig::new("NoSuchFilter"));
        assert!(matches!(
            result,
            Err(PipelineError::ConfigError(msg)) if msg.contains("Unknown filter type") && msg.contains("NoSuchFilter")
        ));
    }

    #[test]
    fn test_builds_extension_filter_from_params() {
        let registry = ComponentRegistry::with_builtins();
        let entry = ComponentConfig::new("ExtensionReferenceFilter")
            .with_param("extensions", vec!["pdf".to_string()])
            .with_param("on_match", "exclude");
        let filter = registry.build_filter(&entry).unwrap();
        assert_eq!(filter.name(), "ExtensionReferenceFilter");
        assert!(filter.matches(&FilterTarget::Reference("http://x/doc.PDF")));
    }

    #[test]
    fn test_empty_registry_knows_nothing() {
        let registry = ComponentRegistry::empty();
        assert!(registry.build_committer(&ComponentConfig::new("MemoryCommitter")).is_err());
    }

    #[tokio::test]
    async fn test_custom_handler_registration() {
        struct Upper;

        #[async_trait::async_trait]
        impl DocumentHandler for Upper {
            fn name(&self) -> &str {
                "Upper"
            }
            fn kind(&self) -> crate::pipeline::handlers::HandlerKind {
                crate::pipeline::handlers::HandlerKind::Transformer
            }
            async fn handle(&self, doc: &mut Document, _p: ParseState) -> Result<bool> {
                let text = doc.content_string()?.to_uppercase();
                doc.replace_content(text.into_bytes())?;
                Ok(true)
            }
        }

        let mut registry = ComponentRegistry::with_builtins();
        registry.register_handler("Upper", |_| Ok(Arc::new(Upper)));
        let handler = registry.build_handler(&ComponentConfig::new("Upper")).unwrap();

        let mut doc = Document::from_bytes("ref", "abc");
        assert!(handler.handle(&mut doc, ParseState::Post).await.unwrap());
        assert_eq!(doc.content_string().unwrap(), "ABC");
    }

    #[test]
    fn test_invalid_params_fail_build() {
        let registry = ComponentRegistry::with_builtins();
        let entry = ComponentConfig::new("ExternalProcessHandler").with_param("command", "  ");
        assert!(matches!(
            registry.build_handler(&entry),
            Err(PipelineError::ConfigValidationError(_))
        ));
    }
}
