use async_trait::async_trait;
use tracing::error;

use super::PipelineContext;
use crate::data_model::{DocumentState, OnSet};
use crate::events::CrawlerEventKind;
use crate::executor::PipelineStage;

/// Fetches the reference and moves the response content and metadata onto
/// the document.
pub struct FetchStage;

#[async_trait]
impl PipelineStage<PipelineContext> for FetchStage {
    fn name(&self) -> &'static str {
        "FetchStage"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> bool {
        let mut response = ctx.services.fetcher.fetch(&ctx.request).await;

        if let Some(content) = response.content.take() {
            ctx.document.content = content;
        }
        ctx.document.metadata.merge(&response.metadata, OnSet::Append);
        if response.content_type.is_some() {
            ctx.document.content_type = response.content_type.clone();
        }

        let state = response.state;
        let message = format!("{} {}", response.status_code, response.reason);
        ctx.fetch_response = Some(response);

        match state {
            DocumentState::New => {
                ctx.fire(CrawlerEventKind::DocumentFetched, message);
                true
            }
            DocumentState::BadStatus => {
                ctx.fire(CrawlerEventKind::RejectedBadStatus, message.clone());
                ctx.finish(state, message);
                false
            }
            DocumentState::Unsupported => {
                ctx.fire(CrawlerEventKind::RejectedUnsupported, message.clone());
                ctx.finish(state, message);
                false
            }
            other => {
                error!(reference = %ctx.request.reference, %message, "Fetch failed");
                ctx.finish(other, message);
                false
            }
        }
    }
}
