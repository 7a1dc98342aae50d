use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::Committer;
use crate::data_model::{Document, Metadata};
use crate::error::Result;

#[derive(Serialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
enum JsonLine<'a> {
    Upsert {
        reference: &'a str,
        metadata: &'a Metadata,
        content: String,
    },
    Delete {
        reference: &'a str,
    },
}

/// Appends one JSON object per operation to a file.
#[derive(Debug)]
pub struct JsonLinesCommitter {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesCommitter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonLinesCommitter {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: &JsonLine<'_>) -> Result<()> {
        let mut serialized = serde_json::to_string(line)?;
        serialized.push('\n');
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(serialized.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Committer for JsonLinesCommitter {
    fn name(&self) -> &str {
        "JsonLinesCommitter"
    }

    async fn upsert(&self, doc: &mut Document) -> Result<()> {
        let mut bytes = Vec::new();
        doc.content.read_to_end(&mut bytes)?;
        let line = JsonLine::Upsert {
            reference: &doc.reference,
            metadata: &doc.metadata,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        };
        self.append(&line).await
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        self.append(&JsonLine::Delete { reference }).await
    }
}
