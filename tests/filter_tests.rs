use std::sync::Arc;

use docflow::data_model::{Document, Metadata};
use docflow::pipeline::filters::{
    accept, default_accept_for, evaluate, ExtensionReferenceFilter, Filter, FilterTarget, OnMatch,
    RegexMetadataFilter, RegexReferenceFilter,
};
use docflow::utils::text_matcher::TextMatcher;

fn extension_filter(exts: &[&str], on_match: OnMatch) -> Arc<dyn Filter> {
    Arc::new(ExtensionReferenceFilter::new(exts.iter().copied(), on_match, false))
}

fn metadata_with(field: &str, value: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.add(field, value);
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclude_extension_rejects_matching_reference() {
        let filters = vec![extension_filter(&["jpg", "png"], OnMatch::Exclude)];
        let default_accept = default_accept_for(&filters);
        assert!(default_accept);

        let decision = evaluate(
            &FilterTarget::Reference("http://example.com/img/photo.JPG"),
            &filters,
            default_accept,
        );
        assert!(!decision.accepted);
        assert_eq!(decision.decided_by, Some("ExtensionReferenceFilter"));

        assert!(accept(
            &FilterTarget::Reference("http://example.com/index.html"),
            &filters,
            default_accept
        ));
    }

    #[test]
    fn test_include_filter_rejects_unmatched_references() {
        let filters = vec![extension_filter(&["pdf"], OnMatch::Include)];
        let default_accept = default_accept_for(&filters);
        assert!(!default_accept);

        assert!(accept(&FilterTarget::Reference("/docs/a.pdf"), &filters, default_accept));
        let decision = evaluate(&FilterTarget::Reference("/docs/a.txt"), &filters, default_accept);
        assert!(!decision.accepted);
        assert_eq!(decision.decided_by, None);
    }

    #[test]
    fn test_first_matching_filter_decides() {
        let filters: Vec<Arc<dyn Filter>> = vec![
            Arc::new(RegexReferenceFilter::new(
                TextMatcher::wildcard("*/private/*").unwrap(),
                OnMatch::Exclude,
            )),
            extension_filter(&["html"], OnMatch::Include),
        ];
        let default_accept = default_accept_for(&filters);

        let private = evaluate(
            &FilterTarget::Reference("http://x.com/private/page.html"),
            &filters,
            default_accept,
        );
        assert!(!private.accepted);
        assert_eq!(private.decided_by, Some("RegexReferenceFilter"));

        assert!(accept(
            &FilterTarget::Reference("http://x.com/public/page.html"),
            &filters,
            default_accept
        ));
    }

    #[test]
    fn test_metadata_filter_on_fetched_headers() {
        let filter = RegexMetadataFilter::new(
            "Content-Type",
            TextMatcher::wildcard("image/*").unwrap(),
            OnMatch::Exclude,
        );
        let image = metadata_with("Content-Type", "image/png");
        let html = metadata_with("Content-Type", "text/html");

        assert!(filter.matches(&FilterTarget::Metadata {
            reference: "http://x.com/a",
            metadata: &image,
        }));
        assert!(!filter.matches(&FilterTarget::Metadata {
            reference: "http://x.com/a",
            metadata: &html,
        }));
        // A bare reference carries no metadata
        assert!(!filter.matches(&FilterTarget::Reference("http://x.com/a")));
    }

    #[test]
    fn test_metadata_filter_on_document() {
        let filter = RegexMetadataFilter::new(
            "lang",
            TextMatcher::regex("^en").unwrap(),
            OnMatch::Include,
        );
        let doc = Document::from_bytes("ref", "text").with_metadata(metadata_with("lang", "en-US"));
        assert!(filter.matches(&FilterTarget::Document(&doc)));
        assert_eq!(FilterTarget::Document(&doc).reference(), "ref");
    }

    #[test]
    fn test_empty_extension_set_includes_everything() {
        let filters = vec![extension_filter(&[], OnMatch::Include)];
        let default_accept = default_accept_for(&filters);
        for reference in ["http://x.com/", "/tmp/a.pdf", "noext", "http://x.com/a.HTML?q=1"] {
            assert!(accept(&FilterTarget::Reference(reference), &filters, default_accept));
        }
    }

    #[test]
    fn test_extension_case_sensitivity() {
        let insensitive = ExtensionReferenceFilter::new(["html"], OnMatch::Include, false);
        assert!(insensitive.matches_reference("x.HTML"));
        assert!(insensitive.matches_reference("x.html"));
        assert!(!insensitive.matches_reference("x.htm"));

        let sensitive = ExtensionReferenceFilter::new(["html"], OnMatch::Include, true);
        assert!(!sensitive.matches_reference("x.HTML"));
        assert!(sensitive.matches_reference("x.html"));
    }

    #[test]
    fn test_empty_chain_accepts() {
        let filters: Vec<Arc<dyn Filter>> = Vec::new();
        assert!(default_accept_for(&filters));
        assert!(accept(&FilterTarget::Reference("anything"), &filters, true));
    }
}
