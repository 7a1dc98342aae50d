use crate::data_model::DocumentState;
use async_trait::async_trait;
use tracing::{debug, warn};

/// State threaded through every stage of one pipeline run.
pub trait StageContext: Send {
    fn document_state(&self) -> DocumentState;

    /// Checked between stages; a cancelled run stops at the next boundary.
    fn is_cancelled(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait PipelineStage<C: StageContext>: Send + Sync {
    fn name(&self) -> &'static str; // For logging/error reporting

    /// Returns `false` to stop the pipeline. The stage is responsible for
    /// leaving the document in the state that explains why.
    async fn execute(&self, ctx: &mut C) -> bool;
}

/// Runs an ordered list of stages against a context, stopping at the first
/// stage that returns `false`. Holds no per-run state and can be shared
/// across workers.
pub struct PipelineExecutor<C: StageContext> {
    stages: Vec<Box<dyn PipelineStage<C>>>,
}

impl<C: StageContext> PipelineExecutor<C> {
    pub fn new(stages: Vec<Box<dyn PipelineStage<C>>>) -> Self {
        if stages.is_empty() {
            warn!("Pipeline created with no stages.");
        }
        PipelineExecutor { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns `true` when every stage ran and accepted the document.
    pub async fn run(&self, ctx: &mut C) -> bool {
        for stage in &self.stages {
            if ctx.is_cancelled() {
                debug!(stage = stage.name(), "Run cancelled before stage");
                return false;
            }
            let state = ctx.document_state();
            if state.is_terminal() {
                debug!(stage = stage.name(), %state, "Document already terminal, not running stage");
                return false;
            }

            debug!("Running stage: {}", stage.name());
            if !stage.execute(ctx).await {
                debug!(
                    stage = stage.name(),
                    state = %ctx.document_state(),
                    "Stage stopped the pipeline"
                );
                return false;
            }
        }
        true
    }
}
