use async_trait::async_trait;

use super::{DocumentHandler, HandlerKind};
use crate::data_model::{Document, OnSet, ParseState};
use crate::error::Result;

/// Adds fixed field values to every document.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantTagger {
    constants: Vec<(String, Vec<String>)>,
    on_set: OnSet,
}

impl ConstantTagger {
    pub fn new(constants: Vec<(String, Vec<String>)>, on_set: OnSet) -> Self {
        ConstantTagger { constants, on_set }
    }
}

#[async_trait]
impl DocumentHandler for ConstantTagger {
    fn name(&self) -> &str {
        "ConstantTagger"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Tagger
    }

    async fn handle(&self, doc: &mut Document, _parse_state: ParseState) -> Result<bool> {
        for (field, values) in &self.constants {
            doc.metadata.set_with(field.clone(), values.clone(), self.on_set);
        }
        Ok(true)
    }
}
