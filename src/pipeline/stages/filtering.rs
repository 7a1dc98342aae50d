use async_trait::async_trait;
use tracing::debug;

use super::PipelineContext;
use crate::data_model::DocumentState;
use crate::events::CrawlerEventKind;
use crate::executor::PipelineStage;
use crate::pipeline::filters::{default_accept_for, evaluate, FilterDecision, FilterTarget};

fn reject(ctx: &mut PipelineContext, phase: &str, decision: FilterDecision) {
    let reason = match decision.decided_by {
        Some(filter) => format!("Rejected by {} {} filter", filter, phase),
        None => format!("No {} filter included the document", phase),
    };
    ctx.fire(CrawlerEventKind::RejectedFilter, reason.clone());
    ctx.finish(DocumentState::Rejected, reason);
}

/// Filters the bare reference before anything is fetched.
pub struct ReferenceFiltersStage;

#[async_trait]
impl PipelineStage<PipelineContext> for ReferenceFiltersStage {
    fn name(&self) -> &'static str {
        "ReferenceFiltersStage"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> bool {
        let filters = &ctx.services.reference_filters;
        let decision = evaluate(
            &FilterTarget::Reference(&ctx.request.reference),
            filters,
            default_accept_for(filters),
        );
        debug!(?decision, "Reference filters evaluated");
        if !decision.accepted {
            reject(ctx, "reference", decision);
        }
        decision.accepted
    }
}

/// Filters on the metadata returned by the fetch.
pub struct MetadataFiltersStage;

#[async_trait]
impl PipelineStage<PipelineContext> for MetadataFiltersStage {
    fn name(&self) -> &'static str {
        "MetadataFiltersStage"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> bool {
        let filters = &ctx.services.metadata_filters;
        let decision = evaluate(
            &FilterTarget::Metadata {
                reference: &ctx.document.reference,
                metadata: &ctx.document.metadata,
            },
            filters,
            default_accept_for(filters),
        );
        if !decision.accepted {
            reject(ctx, "metadata", decision);
        }
        decision.accepted
    }
}

/// Filters the imported document.
pub struct DocumentFiltersStage;

#[async_trait]
impl PipelineStage<PipelineContext> for DocumentFiltersStage {
    fn name(&self) -> &'static str {
        "DocumentFiltersStage"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> bool {
        let filters = &ctx.services.document_filters;
        let decision = evaluate(
            &FilterTarget::Document(&ctx.document),
            filters,
            default_accept_for(filters),
        );
        if !decision.accepted {
            reject(ctx, "document", decision);
        }
        decision.accepted
    }
}
