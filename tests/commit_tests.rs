use std::sync::Arc;

use async_trait::async_trait;
use docflow::data_model::Document;
use docflow::error::{PipelineError, Result};
use docflow::pipeline::committer::{
    CommitDispatcher, Committer, JsonLinesCommitter, MemoryCommitter,
};
use docflow::utils::stream::CachedStreamFactory;
use tempfile::tempdir;

struct FailingCommitter;

#[async_trait]
impl Committer for FailingCommitter {
    fn name(&self) -> &str {
        "FailingCommitter"
    }

    async fn upsert(&self, _doc: &mut Document) -> Result<()> {
        Err(PipelineError::Unexpected("index unavailable".to_string()))
    }

    async fn delete(&self, _reference: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_committer_reads_full_content() {
        let first = Arc::new(MemoryCommitter::new());
        let second = Arc::new(MemoryCommitter::new());
        let committers: Vec<Arc<dyn Committer>> = vec![first.clone(), second.clone()];
        let dispatcher = CommitDispatcher::new(committers);
        assert_eq!(dispatcher.committer_names(), vec!["MemoryCommitter", "MemoryCommitter"]);

        let mut doc = Document::from_bytes("doc-1", "shared bytes");
        doc.metadata.add("lang", "en");
        dispatcher.commit(&mut doc).await.unwrap();

        for committer in [&first, &second] {
            let upserts = committer.upserts();
            assert_eq!(upserts.len(), 1);
            assert_eq!(upserts[0].reference, "doc-1");
            assert_eq!(upserts[0].content, b"shared bytes");
            assert_eq!(upserts[0].metadata.get("lang"), Some("en"));
        }
        // Content is left rewound for whoever reads next
        assert_eq!(doc.content_string().unwrap(), "shared bytes");
    }

    #[tokio::test]
    async fn test_spilled_content_is_committed_intact() {
        let spill_dir = tempdir().unwrap();
        let factory = CachedStreamFactory::new(16, Some(spill_dir.path().to_path_buf()));
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let stream = factory.from_bytes(payload.clone()).unwrap();
        assert!(stream.is_spilled());

        let memory = Arc::new(MemoryCommitter::new());
        let dispatcher = CommitDispatcher::new(vec![memory.clone() as Arc<dyn Committer>]);
        let mut doc = Document::new("big.bin", stream, factory);
        dispatcher.commit(&mut doc).await.unwrap();

        assert_eq!(memory.upserts()[0].content, payload);
    }

    #[tokio::test]
    async fn test_committer_failure_is_commit_error() {
        let memory = Arc::new(MemoryCommitter::new());
        let committers: Vec<Arc<dyn Committer>> = vec![Arc::new(FailingCommitter), memory.clone()];
        let dispatcher = CommitDispatcher::new(committers);
        let mut doc = Document::from_bytes("doc-2", "x");

        let result = dispatcher.commit(&mut doc).await;
        match result {
            Err(PipelineError::CommitError { reference, message }) => {
                assert_eq!(reference, "doc-2");
                assert!(message.contains("FailingCommitter"));
                assert!(message.contains("index unavailable"));
            }
            other => panic!("Expected CommitError, got {:?}", other),
        }
        assert_eq!(memory.upsert_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_reaches_every_committer() {
        let a = Arc::new(MemoryCommitter::new());
        let b = Arc::new(MemoryCommitter::new());
        let committers: Vec<Arc<dyn Committer>> = vec![a.clone(), b.clone()];
        let dispatcher = CommitDispatcher::new(committers);
        dispatcher.delete("gone").await.unwrap();
        assert_eq!(a.deletes(), vec!["gone".to_string()]);
        assert_eq!(b.deletes(), vec!["gone".to_string()]);
    }

    #[tokio::test]
    async fn test_json_lines_committer_appends_operations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("commits.jsonl");
        let committer: Arc<dyn Committer> = Arc::new(JsonLinesCommitter::new(&path));
        let dispatcher = CommitDispatcher::new(vec![committer]);

        let mut doc = Document::from_bytes("doc-3", "line one\nline two");
        doc.metadata.add("tag", "a");
        doc.metadata.add("tag", "b");
        dispatcher.commit(&mut doc).await.unwrap();
        dispatcher.delete("doc-4").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["operation"], "upsert");
        assert_eq!(lines[0]["reference"], "doc-3");
        assert_eq!(lines[0]["content"], "line one\nline two");
        assert_eq!(lines[0]["metadata"]["tag"], serde_json::json!(["a", "b"]));
        assert_eq!(lines[1]["operation"], "delete");
        assert_eq!(lines[1]["reference"], "doc-4");
    }
}
