#![cfg(unix)]

use std::collections::BTreeMap;
use std::time::Duration;

use docflow::config::ComponentConfig;
use docflow::data_model::{Document, OnSet, ParseState};
use docflow::error::PipelineError;
use docflow::pipeline::handlers::external::{ExtractionRule, FieldSource, MetadataFormat};
use docflow::pipeline::handlers::{DocumentHandler, ExternalProcessHandler};
use docflow::registry::ComponentRegistry;

fn doc(reference: &str, content: &str) -> Document {
    Document::from_bytes(reference, content.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_input_and_output() {
        let handler =
            ExternalProcessHandler::new("tr a-z A-Z < ${INPUT} > ${OUTPUT}").unwrap();
        let mut d = doc("file.txt", "hello world");
        assert!(handler.handle(&mut d, ParseState::Post).await.unwrap());
        assert_eq!(d.content_string().unwrap(), "HELLO WORLD");
    }

    #[tokio::test]
    async fn test_stdin_and_stdout() {
        let handler = ExternalProcessHandler::new("tr a-z A-Z").unwrap();
        let mut d = doc("stdin.txt", "piped text");
        handler.handle(&mut d, ParseState::Post).await.unwrap();
        assert_eq!(d.content_string().unwrap(), "PIPED TEXT");
    }

    #[tokio::test]
    async fn test_output_metadata_file_with_replace() {
        let handler = ExternalProcessHandler::new(
            "printf 'field1=new\\nfield9=added\\n' > ${OUTPUT_META}; cat",
        )
        .unwrap()
        .with_on_set(OnSet::Replace);
        let mut d = doc("meta.txt", "unchanged");
        d.metadata.add("field1", "old");
        d.metadata.add("field1", "older");

        handler.handle(&mut d, ParseState::Post).await.unwrap();
        assert_eq!(d.metadata.get_all("field1"), &["new".to_string()]);
        assert_eq!(d.metadata.get("field9"), Some("added"));
        assert_eq!(d.content_string().unwrap(), "unchanged");
    }

    #[tokio::test]
    async fn test_input_metadata_file_is_readable() {
        let handler = ExternalProcessHandler::new("cat ${INPUT_META}")
            .unwrap()
            .tag_only(true)
            .with_extraction_rules(vec![
                ExtractionRule::named("^author=(.*)$", "seen_author", Some(1)).unwrap()
            ]);
        let mut d = doc("authored.txt", "original");
        d.metadata.add("author", "Jane");

        handler.handle(&mut d, ParseState::Post).await.unwrap();
        assert_eq!(d.metadata.get("seen_author"), Some("Jane"));
        assert_eq!(d.content_string().unwrap(), "original");
    }

    #[tokio::test]
    async fn test_json_metadata_exchange() {
        let handler = ExternalProcessHandler::new("cp ${INPUT_META} ${OUTPUT_META}; cat")
            .unwrap()
            .with_metadata_formats(MetadataFormat::Json, MetadataFormat::Json)
            .with_on_set(OnSet::Append);
        let mut d = doc("json.txt", "x");
        d.metadata.add("tag", "a");

        handler.handle(&mut d, ParseState::Post).await.unwrap();
        assert_eq!(d.metadata.get_all("tag"), &["a".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_extraction_from_stdout_and_stderr() {
        let handler = ExternalProcessHandler::new(
            "echo 'field3 StdErrBefore' >&2; echo 'StdoutKey:value1'; echo body",
        )
        .unwrap()
        .tag_only(true)
        .with_extraction_rules(vec![
            ExtractionRule::named("^f.*StdErr.*", "field3", Some(1)).unwrap(),
            ExtractionRule::new("^(\\w+):(.*)$", FieldSource::Group(1), Some(2)).unwrap(),
        ]);
        let mut d = doc("extract.txt", "keep");

        handler.handle(&mut d, ParseState::Post).await.unwrap();
        assert_eq!(d.metadata.get("field3"), Some("field3 StdErrBefore"));
        assert_eq!(d.metadata.get("StdoutKey"), Some("value1"));
        assert_eq!(d.content_string().unwrap(), "keep");
    }

    #[tokio::test]
    async fn test_reverse_tokens_and_extract_fields() {
        let handler = ExternalProcessHandler::new(
            "awk '{ line = \"\"; for (i = NF; i > 0; i--) line = line $i (i > 1 ? \" \" : \"\"); \
             out = out (NR > 1 ? \"\\n\" : \"\") line } END { printf \"%s\", out }' ${INPUT} > ${OUTPUT}; \
             echo field1:value1; echo field2:value2",
        )
        .unwrap()
        .with_extraction_rules(vec![ExtractionRule::new(
            "^(field\\d+):(.*)$",
            FieldSource::Group(1),
            Some(2),
        )
        .unwrap()]);
        let mut d = doc("numbers.txt", "1 2 3\n4 5 6\n7 8 9");

        handler.handle(&mut d, ParseState::Post).await.unwrap();
        assert_eq!(d.content_string().unwrap(), "3 2 1\n6 5 4\n9 8 7");
        assert_eq!(d.metadata.get("field1"), Some("value1"));
        assert_eq!(d.metadata.get("field2"), Some("value2"));
    }

    #[tokio::test]
    async fn test_reference_token_is_quoted() {
        let handler = ExternalProcessHandler::new("printf %s ${REFERENCE}").unwrap();
        let mut d = doc("it's a doc; rm -rf x", "");
        handler.handle(&mut d, ParseState::Post).await.unwrap();
        assert_eq!(d.content_string().unwrap(), "it's a doc; rm -rf x");
    }

    #[tokio::test]
    async fn test_environment_variables() {
        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), "hi there".to_string());
        let handler = ExternalProcessHandler::new("printf %s \"$GREETING\"")
            .unwrap()
            .with_env(env);
        let mut d = doc("env.txt", "");
        handler.handle(&mut d, ParseState::Post).await.unwrap();
        assert_eq!(d.content_string().unwrap(), "hi there");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let handler = ExternalProcessHandler::new("sleep 5")
            .unwrap()
            .with_timeout(Some(Duration::from_millis(200)));
        let mut d = doc("slow.txt", "");
        let started = std::time::Instant::now();
        let result = handler.handle(&mut d, ParseState::Post).await;
        assert!(matches!(result, Err(PipelineError::ExternalProcess(msg)) if msg.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_non_zero_exit_code() {
        let failing = ExternalProcessHandler::new("echo oops >&2; exit 3").unwrap();
        let mut d = doc("exit.txt", "content");
        let result = failing.handle(&mut d, ParseState::Post).await;
        assert!(matches!(result, Err(PipelineError::ExternalProcess(msg)) if msg.contains("oops")));

        let tolerant = ExternalProcessHandler::new("printf done; exit 3")
            .unwrap()
            .ignore_exit_code(true);
        let mut d = doc("exit.txt", "content");
        assert!(tolerant.handle(&mut d, ParseState::Post).await.unwrap());
        assert_eq!(d.content_string().unwrap(), "done");
    }

    #[tokio::test]
    async fn test_built_from_yaml_through_registry() {
        let yaml = r#"
type: ExternalProcessHandler
command: "tr a-z A-Z"
timeout_secs: 10
extraction_rules:
  - pattern: "^(\\w+)=(.*)$"
    field: 1
    value_group: 2
"#;
        let entry: ComponentConfig = serde_yaml::from_str(yaml).unwrap();
        let handler = ComponentRegistry::with_builtins().build_handler(&entry).unwrap();
        let mut d = doc("yaml.txt", "lang=en");
        handler.handle(&mut d, ParseState::Post).await.unwrap();
        assert_eq!(d.content_string().unwrap(), "LANG=EN");
        assert_eq!(d.metadata.get("LANG"), Some("EN"));
    }
}
