//! Single-task orchestration: template lookup → prompts → provider → answer.

use std::collections::HashMap;
use std::sync::Arc;

use smartfield_core::{ConfigError, ConfigStore, Provider, TaskKind};
use thiserror::Error;
use tracing::{debug, warn};

use crate::prompt::{self, PromptError};
use crate::provider::{CompletionProvider, ProviderError, RetryPolicy};
use crate::result::{self, MarkerGate};

/// Source language assumed for every input text.
pub const DEFAULT_SOURCE_LANGUAGE: &str = "english";

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("no completion adapter registered for provider {0}")]
    NoAdapter(Provider),

    #[error("{task} stage: {source}")]
    Provider {
        task: TaskKind,
        #[source]
        source: ProviderError,
    },
}

/// What one stage did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub task: TaskKind,
    pub input: String,
    pub output: String,
    /// The provider gave no usable result and `output` is the unchanged input.
    pub fell_back: bool,
}

/// Runs single tasks against injected configuration and provider adapters.
pub struct StageRunner {
    store: Arc<ConfigStore>,
    adapters: HashMap<Provider, Arc<dyn CompletionProvider>>,
    retry: RetryPolicy,
    gate: MarkerGate,
    source_language: String,
}

impl StageRunner {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            store,
            adapters: HashMap::new(),
            retry: RetryPolicy::default(),
            gate: MarkerGate::default(),
            source_language: DEFAULT_SOURCE_LANGUAGE.to_string(),
        }
    }

    /// Register the adapter used for `provider`'s calls.
    pub fn with_adapter(mut self, provider: Provider, adapter: Arc<dyn CompletionProvider>) -> Self {
        self.adapters.insert(provider, adapter);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_marker_gate(mut self, gate: MarkerGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_source_language(mut self, language: impl Into<String>) -> Self {
        self.source_language = language.into();
        self
    }

    /// Run `task` on `input`.
    ///
    /// A degenerate or placeholder answer is not an error: the outcome falls
    /// back to `input` unchanged.
    pub async fn run_stage(
        &self,
        task: TaskKind,
        provider: Provider,
        input: &str,
        target_language: Option<&str>,
    ) -> Result<StageOutcome, StageError> {
        let template = self.store.resolve(task.as_str(), provider)?;
        let adapter = self
            .adapters
            .get(&provider)
            .ok_or(StageError::NoAdapter(provider))?;

        let request = prompt::build_request(
            template,
            task,
            &self.source_language,
            target_language,
            input,
        )?;

        debug!(%task, %provider, model = %request.model, "calling provider");
        let raw = self
            .retry
            .call(adapter.as_ref(), &request)
            .await
            .map_err(|source| StageError::Provider { task, source })?;

        let (output, fell_back) =
            match result::extract(&raw, &template.default_result_key, self.gate) {
                Some(answer) => (answer, false),
                None => {
                    warn!(%task, %provider, "no usable result, keeping stage input");
                    (input.to_string(), true)
                }
            };

        Ok(StageOutcome {
            task,
            input: input.to_string(),
            output,
            fell_back,
        })
    }
}
