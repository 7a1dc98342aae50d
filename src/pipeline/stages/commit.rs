use async_trait::async_trait;
use tracing::{error, info};

use super::PipelineContext;
use crate::data_model::{Document, DocumentState};
use crate::events::CrawlerEventKind;
use crate::executor::PipelineStage;
use crate::pipeline::importer::ImportResponse;
use crate::utils::prometheus_metrics::DOCUMENTS_COMMITTED_TOTAL;

fn successful_nested<'a>(nested: &'a mut [ImportResponse], out: &mut Vec<&'a mut Document>) {
    for child in nested.iter_mut() {
        let ImportResponse {
            document, nested, ..
        } = child;
        if let Some(doc) = document.as_mut() {
            out.push(doc);
        }
        successful_nested(nested, out);
    }
}

/// Sends the document, then every successfully imported nested document,
/// to the committers and marks the document `Done`.
pub struct CommitStage;

#[async_trait]
impl PipelineStage<PipelineContext> for CommitStage {
    fn name(&self) -> &'static str {
        "CommitStage"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> bool {
        let services = ctx.services.clone();
        if let Err(e) = services.committers.commit(&mut ctx.document).await {
            error!(reference = %ctx.request.reference, error = %e, "Commit failed");
            ctx.finish(DocumentState::Error, e.to_string());
            return false;
        }
        DOCUMENTS_COMMITTED_TOTAL.inc();
        ctx.fire(CrawlerEventKind::DocumentCommitted, "Document committed");

        if let Some(response) = ctx.import_response.as_mut() {
            let mut nested = Vec::new();
            successful_nested(&mut response.nested, &mut nested);
            for doc in nested {
                match services.committers.commit(doc).await {
                    Ok(()) => {
                        doc.state = DocumentState::Done;
                        DOCUMENTS_COMMITTED_TOTAL.inc();
                        services.fire(
                            CrawlerEventKind::DocumentCommitted,
                            Some(&doc.reference),
                            "Embedded document committed",
                        );
                    }
                    Err(e) => {
                        error!(reference = %doc.reference, error = %e, "Commit of embedded document failed");
                    }
                }
            }
        }

        ctx.document.state = DocumentState::Done;
        info!(reference = %ctx.request.reference, "Document done");
        true
    }
}
