// src/pipeline/handlers/external.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::{DocumentHandler, HandlerKind};
use crate::data_model::{Document, Metadata, OnSet, ParseState};
use crate::error::{PipelineError, Result};

pub const TOKEN_INPUT: &str = "${INPUT}";
pub const TOKEN_OUTPUT: &str = "${OUTPUT}";
pub const TOKEN_INPUT_META: &str = "${INPUT_META}";
pub const TOKEN_OUTPUT_META: &str = "${OUTPUT_META}";
pub const TOKEN_REFERENCE: &str = "${REFERENCE}";

/// Serialization used for the `${INPUT_META}` and `${OUTPUT_META}` files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataFormat {
    /// One `key=value` line per value.
    #[default]
    Properties,
    Json,
}

/// Where an extraction rule takes the field name from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FieldSource {
    Group(usize),
    Name(String),
}

/// Regex applied to every stdout/stderr line to pull out field values.
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pattern: Regex,
    field: FieldSource,
    value_group: Option<usize>,
}

impl ExtractionRule {
    pub fn new(
        pattern: &str,
        field: FieldSource,
        value_group: Option<usize>,
    ) -> std::result::Result<Self, regex::Error> {
        Ok(ExtractionRule {
            pattern: Regex::new(pattern)?,
            field,
            value_group,
        })
    }

    pub fn named(pattern: &str, field: &str, value_group: Option<usize>) -> std::result::Result<Self, regex::Error> {
        ExtractionRule::new(pattern, FieldSource::Name(field.to_string()), value_group)
    }

    /// Adds every match found in `line` to `out`. When the value group does
    /// not exist or did not participate, the whole match is used.
    pub fn extract(&self, line: &str, out: &mut Metadata) {
        for caps in self.pattern.captures_iter(line) {
            let field = match &self.field {
                FieldSource::Name(name) => name.as_str(),
                FieldSource::Group(idx) => match caps.get(*idx) {
                    Some(m) => m.as_str(),
                    None => continue,
                },
            };
            if field.is_empty() {
                continue;
            }
            let value = self
                .value_group
                .and_then(|g| caps.get(g))
                .or_else(|| caps.get(0))
                .map(|m| m.as_str())
                .unwrap_or_default();
            out.add(field, value);
        }
    }
}

impl PartialEq for ExtractionRule {
    fn eq(&self, other: &Self) -> bool {
        self.pattern.as_str() == other.pattern.as_str()
            && self.field == other.field
            && self.value_group == other.value_group
    }
}

/// Runs a shell command on a document.
///
/// Content goes in through `${INPUT}` (a temp file) or stdin, and comes
/// back through `${OUTPUT}` or stdout. Metadata can be exchanged through
/// `${INPUT_META}`/`${OUTPUT_META}` files and is also extracted from
/// stdout/stderr lines with [`ExtractionRule`]s.
#[derive(Debug, Clone)]
pub struct ExternalProcessHandler {
    command: String,
    extraction_rules: Vec<ExtractionRule>,
    env: BTreeMap<String, String>,
    metadata_input_format: MetadataFormat,
    metadata_output_format: MetadataFormat,
    on_set: OnSet,
    timeout: Option<Duration>,
    ignore_exit_code: bool,
    tag_only: bool,
    temp_dir: Option<PathBuf>,
}

impl ExternalProcessHandler {
    pub fn new(command: impl Into<String>) -> Result<Self> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(PipelineError::ConfigValidationError(
                "ExternalProcessHandler: command must not be empty".to_string(),
            ));
        }
        if command.contains("${") {
            let known = [
                TOKEN_INPUT,
                TOKEN_OUTPUT,
                TOKEN_INPUT_META,
                TOKEN_OUTPUT_META,
                TOKEN_REFERENCE,
            ];
            let mut rest = command.as_str();
            while let Some(start) = rest.find("${") {
                let tail = &rest[start..];
                let end = tail.find('}').ok_or_else(|| {
                    PipelineError::ConfigValidationError(format!(
                        "ExternalProcessHandler: unterminated token in command '{}'",
                        command
                    ))
                })?;
                let token = &tail[..=end];
                if !known.contains(&token) {
                    return Err(PipelineError::ConfigValidationError(format!(
                        "ExternalProcessHandler: unknown token '{}' in command",
                        token
                    )));
                }
                rest = &tail[end + 1..];
            }
        }
        Ok(ExternalProcessHandler {
            command,
            extraction_rules: Vec::new(),
            env: BTreeMap::new(),
            metadata_input_format: MetadataFormat::default(),
            metadata_output_format: MetadataFormat::default(),
            on_set: OnSet::default(),
            timeout: None,
            ignore_exit_code: false,
            tag_only: false,
            temp_dir: None,
        })
    }

    pub fn with_extraction_rules(mut self, rules: Vec<ExtractionRule>) -> Self {
        self.extraction_rules = rules;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_metadata_formats(mut self, input: MetadataFormat, output: MetadataFormat) -> Self {
        self.metadata_input_format = input;
        self.metadata_output_format = output;
        self
    }

    pub fn with_on_set(mut self, on_set: OnSet) -> Self {
        self.on_set = on_set;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ignore_exit_code(mut self, ignore: bool) -> Self {
        self.ignore_exit_code = ignore;
        self
    }

    /// Keep the document content untouched and only collect metadata.
    pub fn tag_only(mut self, tag_only: bool) -> Self {
        self.tag_only = tag_only;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: Option<PathBuf>) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn uses(&self, token: &str) -> bool {
        self.command.contains(token)
    }

    fn work_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("docflow-ext-");
        Ok(match &self.temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        })
    }

    fn build_command(&self, command_line: &str) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command_line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command_line);
            c
        };
        cmd.envs(&self.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl DocumentHandler for ExternalProcessHandler {
    fn name(&self) -> &str {
        "ExternalProcessHandler"
    }

    fn kind(&self) -> HandlerKind {
        if self.tag_only {
            HandlerKind::Tagger
        } else {
            HandlerKind::Transformer
        }
    }

    #[instrument(skip_all, fields(reference = %doc.reference))]
    async fn handle(&self, doc: &mut Document, _parse_state: ParseState) -> Result<bool> {
        let work_dir = self.work_dir()?;
        let input = doc.content_bytes()?;
        let mut command_line = self.command.clone();

        let stdin_input = if self.uses(TOKEN_INPUT) {
            let path = work_dir.path().join("input");
            tokio::fs::write(&path, &input).await?;
            command_line = command_line.replace(TOKEN_INPUT, &shell_quote(&path));
            None
        } else {
            Some(input)
        };

        let output_path = if self.uses(TOKEN_OUTPUT) {
            let path = work_dir.path().join("output");
            command_line = command_line.replace(TOKEN_OUTPUT, &shell_quote(&path));
            Some(path)
        } else {
            None
        };

        if self.uses(TOKEN_INPUT_META) {
            let path = work_dir.path().join("input-meta");
            let serialized = serialize_metadata(&doc.metadata, self.metadata_input_format)?;
            tokio::fs::write(&path, serialized).await?;
            command_line = command_line.replace(TOKEN_INPUT_META, &shell_quote(&path));
        }

        let output_meta_path = if self.uses(TOKEN_OUTPUT_META) {
            let path = work_dir.path().join("output-meta");
            command_line = command_line.replace(TOKEN_OUTPUT_META, &shell_quote(&path));
            Some(path)
        } else {
            None
        };

        if self.uses(TOKEN_REFERENCE) {
            command_line = command_line.replace(TOKEN_REFERENCE, &shell_quote_str(&doc.reference));
        }

        debug!(command = %command_line, "Running external process");
        let mut cmd = self.build_command(&command_line);
        cmd.stdin(if stdin_input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        let mut child = cmd.spawn().map_err(|e| {
            PipelineError::ExternalProcess(format!("Failed to start '{}': {}", command_line, e))
        })?;

        if let (Some(bytes), Some(mut stdin)) = (stdin_input, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&bytes).await {
                    debug!(error = %e, "External process closed stdin early");
                }
            });
        }

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(PipelineError::ExternalProcess(format!(
                        "'{}' timed out after {:?} and was killed",
                        command_line, limit
                    )));
                }
            },
            None => child.wait_with_output().await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            if self.ignore_exit_code {
                warn!(status = %output.status, "External process failed, exit code ignored");
            } else {
                return Err(PipelineError::ExternalProcess(format!(
                    "'{}' exited with {}: {}",
                    command_line,
                    output.status,
                    stderr.trim()
                )));
            }
        }

        let mut extracted = Metadata::new();
        if !self.extraction_rules.is_empty() {
            for line in stdout.lines().chain(stderr.lines()) {
                for rule in &self.extraction_rules {
                    rule.extract(line, &mut extracted);
                }
            }
        }

        if let Some(path) = output_meta_path {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    let parsed = parse_metadata(&text, self.metadata_output_format)?;
                    extracted.merge(&parsed, OnSet::Append);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("External process did not write an output metadata file");
                }
                Err(e) => return Err(e.into()),
            }
        }
        doc.metadata.merge(&extracted, self.on_set);

        if !self.tag_only {
            let content = match output_path {
                Some(path) => tokio::fs::read(&path).await?,
                None => output.stdout,
            };
            doc.replace_content(content)?;
        }
        Ok(true)
    }
}

fn shell_quote(path: &Path) -> String {
    shell_quote_str(&path.to_string_lossy())
}

fn shell_quote_str(value: &str) -> String {
    if cfg!(windows) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

pub fn serialize_metadata(metadata: &Metadata, format: MetadataFormat) -> Result<String> {
    match format {
        MetadataFormat::Json => Ok(serde_json::to_string_pretty(metadata)?),
        MetadataFormat::Properties => {
            let mut out = String::new();
            for (key, values) in metadata.iter() {
                for value in values {
                    out.push_str(&escape_property(key, true));
                    out.push('=');
                    out.push_str(&escape_property(value, false));
                    out.push('\n');
                }
            }
            Ok(out)
        }
    }
}

pub fn parse_metadata(text: &str, format: MetadataFormat) -> Result<Metadata> {
    match format {
        MetadataFormat::Json => {
            if text.trim().is_empty() {
                return Ok(Metadata::new());
            }
            Ok(serde_json::from_str(text)?)
        }
        MetadataFormat::Properties => {
            let mut metadata = Metadata::new();
            for line in text.lines() {
                let trimmed = line.trim_start();
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                let (key, value) = split_property(trimmed);
                metadata.add(unescape_property(key), unescape_property(value));
            }
            Ok(metadata)
        }
    }
}

fn escape_property(value: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' if is_key => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Splits on the first unescaped `=`.
fn split_property(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '=' if !escaped => return (&line[..idx], &line[idx + 1..]),
            _ => escaped = false,
        }
    }
    (line, "")
}

fn unescape_property(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_group_falls_back_to_whole_match() {
        let rule = ExtractionRule::named("^f.*StdErr.*", "field3", Some(1)).unwrap();
        let mut meta = Metadata::new();
        rule.extract("field3 StdErrBefore", &mut meta);
        assert_eq!(meta.get("field3"), Some("field3 StdErrBefore"));
    }

    #[test]
    fn field_from_capture_group() {
        let rule = ExtractionRule::new("^(S.*?):(.*)", FieldSource::Group(2), Some(1)).unwrap();
        let mut meta = Metadata::new();
        rule.extract("StdErrAfter:field4", &mut meta);
        assert_eq!(meta.get("field4"), Some("StdErrAfter"));
    }

    #[test]
    fn properties_round_trip_multi_values() {
        let mut meta = Metadata::new();
        meta.add("a=b", "line1\nline2");
        meta.add("a=b", "x=y");
        let text = serialize_metadata(&meta, MetadataFormat::Properties).unwrap();
        assert_eq!(parse_metadata(&text, MetadataFormat::Properties).unwrap(), meta);
    }

    #[test]
    fn rejects_unknown_tokens() {
        assert!(ExternalProcessHandler::new("cat ${INPUT} ${NOPE}").is_err());
        assert!(ExternalProcessHandler::new("  ").is_err());
        assert!(ExternalProcessHandler::new("cat ${INPUT_META} > ${OUTPUT}").is_ok());
    }
}
