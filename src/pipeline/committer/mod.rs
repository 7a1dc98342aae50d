// src/pipeline/committer/mod.rs

mod jsonl;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::data_model::Document;
use crate::error::{PipelineError, Result};

pub use jsonl::JsonLinesCommitter;
pub use memory::{MemoryCommitter, UpsertRequest};

/// Downstream sink for accepted documents.
#[async_trait]
pub trait Committer: Send + Sync {
    fn name(&self) -> &str;

    /// Receives the document with its content positioned at the start.
    async fn upsert(&self, doc: &mut Document) -> Result<()>;

    async fn delete(&self, reference: &str) -> Result<()>;
}

/// Sends each commit to every committer in order.
#[derive(Clone, Default)]
pub struct CommitDispatcher {
    committers: Vec<Arc<dyn Committer>>,
}

impl CommitDispatcher {
    pub fn new(committers: Vec<Arc<dyn Committer>>) -> Self {
        CommitDispatcher { committers }
    }

    pub fn committer_names(&self) -> Vec<&str> {
        self.committers.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.committers.is_empty()
    }

    /// Upserts `doc` to every committer, rewinding its content before and
    /// after each one so all of them read the same bytes.
    pub async fn commit(&self, doc: &mut Document) -> Result<()> {
        for committer in &self.committers {
            doc.content.rewind()?;
            debug!(committer = committer.name(), reference = %doc.reference, "Upserting document");
            committer
                .upsert(doc)
                .await
                .map_err(|e| commit_error(&doc.reference, committer.name(), e))?;
            doc.content.rewind()?;
        }
        Ok(())
    }

    pub async fn delete(&self, reference: &str) -> Result<()> {
        for committer in &self.committers {
            debug!(committer = committer.name(), %reference, "Deleting document");
            committer
                .delete(reference)
                .await
                .map_err(|e| commit_error(reference, committer.name(), e))?;
        }
        Ok(())
    }
}

fn commit_error(reference: &str, committer: &str, err: PipelineError) -> PipelineError {
    match err {
        PipelineError::CommitError { .. } => err,
        other => PipelineError::CommitError {
            reference: reference.to_string(),
            message: format!("{}: {}", committer, other),
        },
    }
}
