use std::io::Read;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::PipelineContext;
use crate::data_model::DocumentState;
use crate::events::CrawlerEventKind;
use crate::executor::PipelineStage;

const ROBOTS_HEADER: &str = "x-robots-tag";
/// Only the head of an HTML page is scanned for the robots meta tag.
const HTML_SCAN_LIMIT: u64 = 64 * 1024;

static META_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<meta\s[^>]*>").expect("Failed to compile meta tag pattern")
});
static META_NAME_ROBOTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bname\s*=\s*["']?robots["'\s/>]"#).expect("Failed to compile meta name pattern")
});
static META_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bcontent\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("Failed to compile meta content pattern")
});

/// Robots directives gathered from response headers and HTML meta tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RobotsMeta {
    pub noindex: bool,
    pub nofollow: bool,
}

impl RobotsMeta {
    /// Parses a comma separated directive list such as `noindex, nofollow`.
    pub fn parse(directives: &str) -> Self {
        let mut meta = RobotsMeta::default();
        meta.add_directives(directives);
        meta
    }

    fn add_directives(&mut self, directives: &str) {
        for directive in directives.split(',') {
            // Header values may be scoped to a user agent: "googlebot: noindex".
            let directive = directive.rsplit(':').next().unwrap_or(directive);
            match directive.trim().to_ascii_lowercase().as_str() {
                "noindex" => self.noindex = true,
                "nofollow" => self.nofollow = true,
                "none" => {
                    self.noindex = true;
                    self.nofollow = true;
                }
                _ => {}
            }
        }
    }

    fn from_html(html: &str) -> Option<Self> {
        let mut found: Option<RobotsMeta> = None;
        for tag in META_TAG.find_iter(html) {
            let tag = tag.as_str();
            if !META_NAME_ROBOTS.is_match(tag) {
                continue;
            }
            if let Some(caps) = META_CONTENT.captures(tag) {
                let content = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                found.get_or_insert_with(RobotsMeta::default).add_directives(content);
            }
        }
        found
    }
}

fn is_html(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.starts_with("text/html") || ct.starts_with("application/xhtml")
    })
}

/// Reads robots directives into the context.
pub struct RobotsMetaStage;

#[async_trait]
impl PipelineStage<PipelineContext> for RobotsMetaStage {
    fn name(&self) -> &'static str {
        "RobotsMetaStage"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> bool {
        if ctx.services.ignore_robots_meta {
            return true;
        }

        let mut robots: Option<RobotsMeta> = None;
        let header_values: Vec<String> = ctx
            .document
            .metadata
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(ROBOTS_HEADER))
            .flat_map(|(_, values)| values.iter().cloned())
            .collect();
        for value in header_values {
            robots.get_or_insert_with(RobotsMeta::default).add_directives(&value);
        }

        if is_html(ctx.document.content_type.as_deref()) {
            let mut head = Vec::new();
            let read = Read::by_ref(&mut ctx.document.content)
                .take(HTML_SCAN_LIMIT)
                .read_to_end(&mut head);
            let rewound = ctx.document.content.rewind();
            match read.and(rewound) {
                Ok(()) => {
                    if let Some(from_html) = RobotsMeta::from_html(&String::from_utf8_lossy(&head)) {
                        let merged = robots.get_or_insert_with(RobotsMeta::default);
                        merged.noindex |= from_html.noindex;
                        merged.nofollow |= from_html.nofollow;
                    }
                }
                Err(e) => {
                    warn!(reference = %ctx.request.reference, error = %e, "Could not read content for robots meta");
                }
            }
        }

        debug!(?robots, "Robots meta resolved");
        ctx.robots_meta = robots;
        true
    }
}

/// Rejects documents whose robots directives forbid indexing.
pub struct RobotsMetaNoIndexStage;

#[async_trait]
impl PipelineStage<PipelineContext> for RobotsMetaNoIndexStage {
    fn name(&self) -> &'static str {
        "RobotsMetaNoIndexStage"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> bool {
        let noindex = !ctx.services.ignore_robots_meta
            && ctx.robots_meta.is_some_and(|meta| meta.noindex);
        if noindex {
            let reason = "Robots meta directives forbid indexing (noindex)";
            ctx.fire(CrawlerEventKind::RejectedRobotsMetaNoindex, reason);
            ctx.finish(DocumentState::Rejected, reason);
            return false;
        }
        true
    }
}
