use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use csv::{Terminator, WriterBuilder};
use tracing::debug;

use super::{DocumentHandler, HandlerKind};
use crate::data_model::{Document, ParseState};
use crate::error::{PipelineError, Result};

#[derive(Debug, Default)]
struct FieldStats {
    occurrences: u64,
    samples: BTreeSet<String>,
    sample_order: Vec<String>,
}

/// Collects a report of every metadata field seen across documents and
/// rewrites it as CSV after each document.
///
/// Each row is `field[,count],sample1..sampleN`: the count is the number of
/// documents carrying the field, samples are distinct first-seen values cut
/// to `truncate_samples_at` characters and padded with empty cells up to
/// `max_samples`. Rows are sorted by field name.
#[derive(Debug)]
pub struct FieldReportTagger {
    file: PathBuf,
    max_samples: usize,
    truncate_samples_at: Option<usize>,
    with_headers: bool,
    with_occurrences: bool,
    fields: Mutex<BTreeMap<String, FieldStats>>,
}

impl FieldReportTagger {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        FieldReportTagger {
            file: file.into(),
            max_samples: 3,
            truncate_samples_at: Some(100),
            with_headers: false,
            with_occurrences: false,
            fields: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    /// `None` keeps samples whole.
    pub fn with_truncate_samples_at(mut self, truncate_at: Option<usize>) -> Self {
        self.truncate_samples_at = truncate_at;
        self
    }

    pub fn with_headers(mut self, with_headers: bool) -> Self {
        self.with_headers = with_headers;
        self
    }

    pub fn with_occurrences(mut self, with_occurrences: bool) -> Self {
        self.with_occurrences = with_occurrences;
        self
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    fn truncate(&self, value: &str) -> String {
        match self.truncate_samples_at {
            Some(limit) => value.chars().take(limit).collect(),
            None => value.to_string(),
        }
    }

    /// Updates the statistics and rewrites the report while holding the
    /// lock, so the file always reflects the latest state.
    fn record(&self, doc: &Document) -> Result<usize> {
        let mut fields = self
            .fields
            .lock()
            .map_err(|e| PipelineError::Unexpected(format!("Field report lock poisoned: {}", e)))?;

        for (field, values) in doc.metadata.iter() {
            let stats = fields.entry(field.to_string()).or_default();
            stats.occurrences += 1;
            for value in values {
                if stats.sample_order.len() >= self.max_samples {
                    break;
                }
                let sample = self.truncate(value);
                if stats.samples.insert(sample.clone()) {
                    stats.sample_order.push(sample);
                }
            }
        }

        let rows: Vec<Vec<String>> = fields
            .iter()
            .map(|(field, stats)| {
                let mut row = Vec::with_capacity(2 + self.max_samples);
                row.push(field.clone());
                if self.with_occurrences {
                    row.push(stats.occurrences.to_string());
                }
                for i in 0..self.max_samples {
                    row.push(stats.sample_order.get(i).cloned().unwrap_or_default());
                }
                row
            })
            .collect();
        self.write_report(&rows)?;
        Ok(rows.len())
    }

    fn write_report(&self, rows: &[Vec<String>]) -> Result<()> {
        if let Some(parent) = self.file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut writer = WriterBuilder::new()
            .flexible(true)
            .terminator(Terminator::Any(b'\n'))
            .from_path(&self.file)?;
        if self.with_headers {
            let mut header = vec!["field".to_string()];
            if self.with_occurrences {
                header.push("occurrences".to_string());
            }
            header.extend((1..=self.max_samples).map(|i| format!("sample{}", i)));
            writer.write_record(&header)?;
        }
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl DocumentHandler for FieldReportTagger {
    fn name(&self) -> &str {
        "FieldReportTagger"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Tagger
    }

    async fn handle(&self, doc: &mut Document, _parse_state: ParseState) -> Result<bool> {
        let fields = self.record(doc)?;
        debug!(file = %self.file.display(), fields, "Field report updated");
        Ok(true)
    }
}
