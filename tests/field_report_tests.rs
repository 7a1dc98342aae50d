use std::sync::Arc;

use docflow::data_model::{Document, ParseState};
use docflow::pipeline::handlers::{DocumentHandler, FieldReportTagger};
use tempfile::tempdir;

fn doc_with(fields: &[(&str, &str)]) -> Document {
    let mut doc = Document::from_bytes("ref", Vec::new());
    for (field, value) in fields {
        doc.metadata.add(*field, *value);
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_report_rows_counts_and_samples() {
        let dir = tempdir().unwrap();
        let report = dir.path().join("report.csv");
        let tagger = FieldReportTagger::new(&report)
            .with_max_samples(2)
            .with_truncate_samples_at(Some(3))
            .with_headers(false)
            .with_occurrences(true);

        let docs = vec![
            doc_with(&[("a", "a111"), ("b", "b111"), ("c", "c111"), ("d", "d111")]),
            doc_with(&[("a", "a222"), ("b", "b222"), ("c", "c111x"), ("e", "e111")]),
            doc_with(&[("a", "a111"), ("b", "b111"), ("d", "d11"), ("e", "e11zzz")]),
            doc_with(&[("a", "a22"), ("f", "f11")]),
            doc_with(&[("a", "a333"), ("f", "f111")]),
            doc_with(&[("a", "a11"), ("g", "g222")]),
        ];
        for mut doc in docs {
            assert!(tagger.handle(&mut doc, ParseState::Post).await.unwrap());
        }

        let content = std::fs::read_to_string(&report).unwrap();
        let expected = "\
a,6,a11,a22
b,3,b11,b22
c,2,c11,
d,2,d11,
e,2,e11,
f,2,f11,
g,1,g22,
";
        assert_eq!(content, expected);
    }

    #[tokio::test]
    async fn test_report_with_headers_without_counts() {
        let dir = tempdir().unwrap();
        let report = dir.path().join("nested").join("fields.csv");
        let tagger = FieldReportTagger::new(&report)
            .with_max_samples(2)
            .with_truncate_samples_at(None)
            .with_headers(true);

        let mut doc = doc_with(&[("title", "A long title, with a comma"), ("lang", "en")]);
        tagger.handle(&mut doc, ParseState::Post).await.unwrap();

        let content = std::fs::read_to_string(&report).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "field,sample1,sample2");
        assert_eq!(lines[1], "lang,en,");
        assert_eq!(lines[2], "title,\"A long title, with a comma\",");
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn test_report_is_rewritten_after_every_document() {
        let dir = tempdir().unwrap();
        let report = dir.path().join("report.csv");
        let tagger = FieldReportTagger::new(&report)
            .with_max_samples(1)
            .with_occurrences(true);

        let mut first = doc_with(&[("x", "1")]);
        tagger.handle(&mut first, ParseState::Post).await.unwrap();
        assert_eq!(std::fs::read_to_string(&report).unwrap(), "x,1,1\n");

        let mut second = doc_with(&[("x", "2"), ("y", "3")]);
        tagger.handle(&mut second, ParseState::Post).await.unwrap();
        assert_eq!(std::fs::read_to_string(&report).unwrap(), "x,2,1\ny,1,3\n");
    }

    #[tokio::test]
    async fn test_concurrent_documents_are_all_counted() {
        let dir = tempdir().unwrap();
        let report = dir.path().join("report.csv");
        let tagger = Arc::new(
            FieldReportTagger::new(&report)
                .with_max_samples(1)
                .with_occurrences(true),
        );

        let mut tasks = Vec::new();
        for i in 0..20 {
            let tagger = tagger.clone();
            tasks.push(tokio::spawn(async move {
                let mut doc = doc_with(&[("shared", if i == 0 { "first" } else { "other" })]);
                tagger.handle(&mut doc, ParseState::Post).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let content = std::fs::read_to_string(&report).unwrap();
        assert!(content.starts_with("shared,20,"), "report was {:?}", content);
    }
}
