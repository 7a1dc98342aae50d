// src/pipeline/filters/mod.rs

mod extension_filter;
mod regex_filter;

use std::sync::Arc;

use serde::Deserialize;

use crate::data_model::{Document, Metadata};

pub use extension_filter::ExtensionReferenceFilter;
pub use regex_filter::{RegexMetadataFilter, RegexReferenceFilter};

/// Policy applied when a filter's predicate matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMatch {
    #[default]
    Include,
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    Include,
    Exclude,
    NoMatch,
}

impl From<OnMatch> for FilterResult {
    fn from(on_match: OnMatch) -> Self {
        match on_match {
            OnMatch::Include => FilterResult::Include,
            OnMatch::Exclude => FilterResult::Exclude,
        }
    }
}

/// What a filter is asked to judge. The three crawl phases hand filters a
/// bare reference, a reference with its fetched metadata, or the imported
/// document.
#[derive(Debug, Clone, Copy)]
pub enum FilterTarget<'a> {
    Reference(&'a str),
    Metadata {
        reference: &'a str,
        metadata: &'a Metadata,
    },
    Document(&'a Document),
}

impl<'a> FilterTarget<'a> {
    pub fn reference(&self) -> &'a str {
        match self {
            FilterTarget::Reference(reference) => reference,
            FilterTarget::Metadata { reference, .. } => reference,
            FilterTarget::Document(doc) => &doc.reference,
        }
    }

    pub fn metadata(&self) -> Option<&'a Metadata> {
        match self {
            FilterTarget::Reference(_) => None,
            FilterTarget::Metadata { metadata, .. } => Some(metadata),
            FilterTarget::Document(doc) => Some(&doc.metadata),
        }
    }
}

pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_match(&self) -> OnMatch;

    /// Whether the filter's predicate matches; `on_match` decides what a
    /// match means.
    fn matches(&self, target: &FilterTarget<'_>) -> bool;

    fn evaluate(&self, target: &FilterTarget<'_>) -> FilterResult {
        if self.matches(target) {
            self.on_match().into()
        } else {
            FilterResult::NoMatch
        }
    }
}

/// Outcome of a filter chain, with the filter that decided it (if any).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDecision {
    pub accepted: bool,
    pub decided_by: Option<&'static str>,
}

/// Evaluates `filters` in order. The first filter whose predicate matches
/// decides; when none match `default_accept` is returned.
pub fn evaluate(
    target: &FilterTarget<'_>,
    filters: &[Arc<dyn Filter>],
    default_accept: bool,
) -> FilterDecision {
    for filter in filters {
        match filter.evaluate(target) {
            FilterResult::Include => {
                return FilterDecision {
                    accepted: true,
                    decided_by: Some(filter.name()),
                }
            }
            FilterResult::Exclude => {
                return FilterDecision {
                    accepted: false,
                    decided_by: Some(filter.name()),
                }
            }
            FilterResult::NoMatch => {}
        }
    }
    FilterDecision {
        accepted: default_accept,
        decided_by: None,
    }
}

pub fn accept(target: &FilterTarget<'_>, filters: &[Arc<dyn Filter>], default_accept: bool) -> bool {
    evaluate(target, filters, default_accept).accepted
}

/// Chain default used by the crawler: once any `Include` filter is
/// configured, references matching none of the filters are rejected.
pub fn default_accept_for(filters: &[Arc<dyn Filter>]) -> bool {
    !filters.iter().any(|f| f.on_match() == OnMatch::Include)
}
