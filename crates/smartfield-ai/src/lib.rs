//! Derived-field pipeline: prompt templating, provider calls, result
//! validation, and record materialization.

pub mod materialize;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod result;
pub mod stage;
pub mod title;

#[cfg(test)]
mod testing;

pub use materialize::{MaterializeError, MaterializePolicy, Materializer};
#[cfg(feature = "openai")]
pub use openai::OpenAiClient;
pub use pipeline::{PipelineRun, PipelineRunner};
pub use prompt::PromptError;
pub use provider::{CompletionProvider, CompletionRequest, ProviderError, RetryPolicy, Role};
pub use result::MarkerGate;
pub use stage::{StageError, StageOutcome, StageRunner};
