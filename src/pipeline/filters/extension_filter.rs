use std::collections::HashSet;

use reqwest::Url;

use super::{Filter, FilterTarget, OnMatch};

/// Matches references by file extension.
///
/// The extension is taken from the path component only, so query strings
/// and fragments never count. An empty extension set matches everything.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionReferenceFilter {
    extensions: HashSet<String>,
    case_sensitive: bool,
    on_match: OnMatch,
}

impl ExtensionReferenceFilter {
    pub fn new<I, S>(extensions: I, on_match: OnMatch, case_sensitive: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty())
            .map(|ext| {
                if case_sensitive {
                    ext
                } else {
                    ext.to_lowercase()
                }
            })
            .collect();
        ExtensionReferenceFilter {
            extensions,
            case_sensitive,
            on_match,
        }
    }

    pub fn extensions(&self) -> &HashSet<String> {
        &self.extensions
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn matches_reference(&self, reference: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let ext = reference_extension(reference);
        if self.case_sensitive {
            self.extensions.contains(&ext)
        } else {
            self.extensions.contains(&ext.to_lowercase())
        }
    }
}

impl Filter for ExtensionReferenceFilter {
    fn name(&self) -> &'static str {
        "ExtensionReferenceFilter"
    }

    fn on_match(&self) -> OnMatch {
        self.on_match
    }

    fn matches(&self, target: &FilterTarget<'_>) -> bool {
        self.matches_reference(target.reference())
    }
}

/// Path of a URL, or the reference itself minus query and fragment when it
/// does not parse as an absolute URL.
fn reference_path(reference: &str) -> String {
    match Url::parse(reference) {
        Ok(url) if !url.cannot_be_a_base() => url.path().to_string(),
        _ => {
            let end = reference.find(['?', '#']).unwrap_or(reference.len());
            reference[..end].to_string()
        }
    }
}

fn reference_extension(reference: &str) -> String {
    let path = reference_path(reference);
    let name_start = path.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    let name = &path[name_start..];
    match name.rfind('.') {
        Some(dot) => name[dot + 1..].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_ignores_query_and_fragment() {
        assert_eq!(reference_extension("http://example.com/a/b.html?x=1.pdf#y.doc"), "html");
        assert_eq!(reference_extension("/tmp/file.TXT?x=1"), "TXT");
        assert_eq!(reference_extension("http://example.com/dir.d/noext"), "");
        assert_eq!(reference_extension("c:\\docs\\report.pdf"), "pdf");
    }
}
