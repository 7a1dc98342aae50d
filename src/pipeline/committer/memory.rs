use std::io::Read;
use std::sync::Mutex;

use async_trait::async_trait;

use super::Committer;
use crate::data_model::{Document, Metadata};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRequest {
    pub reference: String,
    pub metadata: Metadata,
    pub content: Vec<u8>,
}

/// Keeps committed documents in memory.
#[derive(Debug, Default)]
pub struct MemoryCommitter {
    upserts: Mutex<Vec<UpsertRequest>>,
    deletes: Mutex<Vec<String>>,
}

impl MemoryCommitter {
    pub fn new() -> Self {
        MemoryCommitter::default()
    }

    pub fn upserts(&self) -> Vec<UpsertRequest> {
        self.upserts.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.lock().map(|u| u.len()).unwrap_or_default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> PipelineError {
    PipelineError::Unexpected(format!("MemoryCommitter lock poisoned: {}", e))
}

#[async_trait]
impl Committer for MemoryCommitter {
    fn name(&self) -> &str {
        "MemoryCommitter"
    }

    async fn upsert(&self, doc: &mut Document) -> Result<()> {
        // Reads from the current position; the dispatcher rewinds around us.
        let mut content = Vec::new();
        doc.content.read_to_end(&mut content)?;
        self.upserts.lock().map_err(poisoned)?.push(UpsertRequest {
            reference: doc.reference.clone(),
            metadata: doc.metadata.clone(),
            content,
        });
        Ok(())
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        self.deletes.lock().map_err(poisoned)?.push(reference.to_string());
        Ok(())
    }
}
