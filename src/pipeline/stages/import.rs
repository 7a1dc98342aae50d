use async_trait::async_trait;
use tracing::debug;

use super::PipelineContext;
use crate::data_model::{Document, DocumentState};
use crate::events::CrawlerEventKind;
use crate::executor::PipelineStage;
use crate::pipeline::importer::ImportStatus;

/// Runs the importer on the fetched document. A successful import puts the
/// imported document back on the context and keeps the response for its
/// nested documents.
pub struct ImportStage;

#[async_trait]
impl PipelineStage<PipelineContext> for ImportStage {
    fn name(&self) -> &'static str {
        "ImportStage"
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> bool {
        let factory = ctx.services.stream_factory.clone();
        let placeholder = Document::new(ctx.request.reference.clone(), factory.empty(), factory);
        let fetched = std::mem::replace(&mut ctx.document, placeholder);

        let mut response = ctx.services.importer.import_document(fetched).await;
        debug!(
            status = %response.status,
            nodes = response.node_count(),
            "Import finished"
        );

        let accepted = match response.status {
            ImportStatus::Success => {
                if let Some(doc) = response.document.take() {
                    ctx.document = doc;
                }
                true
            }
            ImportStatus::Rejected => {
                ctx.fire(CrawlerEventKind::RejectedImport, response.description.clone());
                ctx.finish(DocumentState::Rejected, response.description.clone());
                false
            }
            ImportStatus::Error => {
                ctx.fire(CrawlerEventKind::ImportError, response.description.clone());
                ctx.finish(DocumentState::Error, response.description.clone());
                false
            }
        };
        ctx.import_response = Some(response);
        accepted
    }
}
