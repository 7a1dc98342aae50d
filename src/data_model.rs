use std::fmt;
use std::io;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::utils::stream::{CachedStream, CachedStreamFactory};

pub const REFERENCE_FIELD: &str = "document.reference";
pub const CONTENT_TYPE_FIELD: &str = "document.contentType";
pub const EMBEDDED_PARENT_FIELD: &str = "document.embeddedParent";
pub const EMBEDDED_INDEX_FIELD: &str = "document.embeddedIndex";

/// Lifecycle of a document travelling through the crawler pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentState {
    New,
    Rejected,
    BadStatus,
    Unsupported,
    Error,
    Done,
}

impl DocumentState {
    pub fn is_new(self) -> bool {
        self == DocumentState::New
    }

    pub fn is_terminal(self) -> bool {
        !self.is_new()
    }

    /// Terminal states other than `Done`.
    pub fn is_rejected(self) -> bool {
        matches!(
            self,
            DocumentState::Rejected
                | DocumentState::BadStatus
                | DocumentState::Unsupported
                | DocumentState::Error
        )
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentState::New => "NEW",
            DocumentState::Rejected => "REJECTED",
            DocumentState::BadStatus => "BAD_STATUS",
            DocumentState::Unsupported => "UNSUPPORTED",
            DocumentState::Error => "ERROR",
            DocumentState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Whether handlers run before or after the document was parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseState {
    Pre,
    Post,
}

impl fmt::Display for ParseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseState::Pre => f.write_str("PRE"),
            ParseState::Post => f.write_str("POST"),
        }
    }
}

/// How values are stored when a field already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnSet {
    #[default]
    Append,
    Prepend,
    Replace,
    /// Only set when the field has no value yet.
    Optional,
}

/// Ordered, multi-valued string mapping. Keys are unique and keep their
/// first-insertion order; values keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, Vec<String>)>,
}

impl Metadata {
    pub fn new() -> Self {
        Metadata::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        match self.position(key) {
            Some(idx) => &self.entries[idx].1,
            None => &[],
        }
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(idx) => self.entries[idx].1.push(value.into()),
            None => self.entries.push((key, vec![value.into()])),
        }
    }

    /// Replaces all values of `key` with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set_all(key, vec![value.into()]);
    }

    pub fn set_all(&mut self, key: impl Into<String>, values: Vec<String>) {
        let key = key.into();
        match self.position(&key) {
            Some(idx) => self.entries[idx].1 = values,
            None => self.entries.push((key, values)),
        }
    }

    pub fn set_with(&mut self, key: impl Into<String>, values: Vec<String>, on_set: OnSet) {
        let key = key.into();
        match (self.position(&key), on_set) {
            (None, _) => self.entries.push((key, values)),
            (Some(idx), OnSet::Append) => self.entries[idx].1.extend(values),
            (Some(idx), OnSet::Prepend) => {
                let existing = std::mem::replace(&mut self.entries[idx].1, values);
                self.entries[idx].1.extend(existing);
            }
            (Some(idx), OnSet::Replace) => self.entries[idx].1 = values,
            (Some(idx), OnSet::Optional) => {
                if self.entries[idx].1.is_empty() {
                    self.entries[idx].1 = values;
                }
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.position(key).map(|idx| self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Copies every field of `other` into `self` using `on_set`.
    pub fn merge(&mut self, other: &Metadata, on_set: OnSet) {
        for (key, values) in other.iter() {
            self.set_with(key, values.to_vec(), on_set);
        }
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, values) in &self.entries {
            map.serialize_entry(key, values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MetadataVisitor;

        impl<'de> Visitor<'de> for MetadataVisitor {
            type Value = Metadata;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to a value or a list of values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Metadata, A::Error> {
                #[derive(Deserialize)]
                #[serde(untagged)]
                enum OneOrMany {
                    One(String),
                    Many(Vec<String>),
                }

                let mut metadata = Metadata::new();
                while let Some((key, value)) = access.next_entry::<String, OneOrMany>()? {
                    let values = match value {
                        OneOrMany::One(v) => vec![v],
                        OneOrMany::Many(v) => v,
                    };
                    metadata.set_with(key, values, OnSet::Append);
                }
                Ok(metadata)
            }
        }

        deserializer.deserialize_map(MetadataVisitor)
    }
}

/// A document and its content while it is being processed.
#[derive(Debug)]
pub struct Document {
    pub reference: String,
    pub metadata: Metadata,
    pub content: CachedStream,
    pub state: DocumentState,
    pub parse_state: ParseState,
    pub content_type: Option<String>,
    stream_factory: CachedStreamFactory,
}

impl Document {
    pub fn new(
        reference: impl Into<String>,
        content: CachedStream,
        stream_factory: CachedStreamFactory,
    ) -> Self {
        Document {
            reference: reference.into(),
            metadata: Metadata::new(),
            content,
            state: DocumentState::New,
            parse_state: ParseState::Pre,
            content_type: None,
            stream_factory,
        }
    }

    /// In-memory document using the default stream factory.
    pub fn from_bytes(reference: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Document::new(
            reference,
            CachedStream::from_memory(bytes.into()),
            CachedStreamFactory::default(),
        )
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn stream_factory(&self) -> &CachedStreamFactory {
        &self.stream_factory
    }

    pub fn replace_content(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        self.content = self.stream_factory.from_bytes(bytes)?;
        Ok(())
    }

    pub fn content_bytes(&mut self) -> io::Result<Vec<u8>> {
        self.content.read_all()
    }

    pub fn content_string(&mut self) -> io::Result<String> {
        self.content.read_all_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_keeps_insertion_order_and_values() {
        let mut meta = Metadata::new();
        meta.add("b", "1");
        meta.add("a", "2");
        meta.add("b", "3");
        assert_eq!(meta.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(meta.get_all("b"), &["1".to_string(), "3".to_string()]);
        assert_eq!(meta.get("a"), Some("2"));
    }

    #[test]
    fn on_set_policies() {
        let mut meta = Metadata::new();
        meta.set("f", "old");
        meta.set_with("f", vec!["new".into()], OnSet::Optional);
        assert_eq!(meta.get_all("f"), &["old".to_string()]);
        meta.set_with("f", vec!["first".into()], OnSet::Prepend);
        assert_eq!(meta.get_all("f"), &["first".to_string(), "old".to_string()]);
        meta.set_with("f", vec!["only".into()], OnSet::Replace);
        assert_eq!(meta.get_all("f"), &["only".to_string()]);
    }

    #[test]
    fn metadata_json_round_trip_accepts_single_values() {
        let meta: Metadata = serde_json::from_str(r#"{"a": "x", "b": ["y", "z"]}"#).unwrap();
        assert_eq!(meta.get("a"), Some("x"));
        assert_eq!(meta.get_all("b").len(), 2);
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"a":["x"],"b":["y","z"]}"#);
    }

    #[test]
    fn terminal_states() {
        assert!(!DocumentState::New.is_terminal());
        assert!(DocumentState::Done.is_terminal());
        assert!(!DocumentState::Done.is_rejected());
        assert!(DocumentState::BadStatus.is_rejected());
    }
}
