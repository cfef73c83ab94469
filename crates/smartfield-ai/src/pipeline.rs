//! Ordered multi-stage runs for one derived field.

use smartfield_core::{DerivedFieldSpec, FieldKind, TaskKind};
use tracing::{debug, info};

use crate::stage::{StageError, StageOutcome, StageRunner};
use crate::title;

/// Trace of one pipeline run. Created per materialization and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    pub input_text: String,
    /// Stages that ran, in order. Disabled stages are absent.
    pub stages: Vec<StageOutcome>,
    /// Title step of a title field, run after the stages.
    pub title: Option<StageOutcome>,
    pub current_text: String,
}

impl PipelineRun {
    fn new(input_text: &str) -> Self {
        Self {
            input_text: input_text.to_string(),
            stages: Vec::new(),
            title: None,
            current_text: input_text.to_string(),
        }
    }

    /// Final text of the run.
    pub fn output(&self) -> &str {
        &self.current_text
    }

    pub fn into_output(self) -> String {
        self.current_text
    }

    /// Tasks that ran, in order.
    pub fn tasks(&self) -> Vec<TaskKind> {
        self.stages.iter().map(|s| s.task).collect()
    }
}

/// Chains the enabled stages of a [`DerivedFieldSpec`]:
/// spell-correct → summarize → translate → emojify.
pub struct PipelineRunner {
    stages: StageRunner,
}

impl PipelineRunner {
    pub fn new(stages: StageRunner) -> Self {
        Self { stages }
    }

    /// Run every enabled stage on `source_text`, each consuming the previous
    /// stage's output. A title field then titles the stage output. The first
    /// stage error ends the run.
    pub async fn run(
        &self,
        spec: &DerivedFieldSpec,
        source_text: &str,
    ) -> Result<PipelineRun, StageError> {
        let mut run = PipelineRun::new(source_text);
        let provider = spec.provider();

        for task in spec.enabled_stages() {
            let target = match task {
                TaskKind::Translate => spec.target_language(),
                _ => None,
            };
            let outcome = self
                .stages
                .run_stage(task, provider, &run.current_text, target)
                .await?;
            debug!(%task, fell_back = outcome.fell_back, "stage complete");
            run.current_text.clone_from(&outcome.output);
            run.stages.push(outcome);
        }

        if let FieldKind::Title { max_length } = spec.kind() {
            let outcome =
                title::generate(&self.stages, provider, &run.current_text, max_length).await?;
            debug!(fell_back = outcome.fell_back, "title complete");
            run.current_text.clone_from(&outcome.output);
            run.title = Some(outcome);
        }

        if !run.stages.is_empty() || run.title.is_some() {
            let fallbacks = run
                .stages
                .iter()
                .chain(run.title.iter())
                .filter(|s| s.fell_back)
                .count();
            info!(
                %provider,
                stages = run.stages.len(),
                titled = run.title.is_some(),
                fallbacks,
                "pipeline run complete"
            );
        }
        Ok(run)
    }
}
