//! Test doubles shared by the pipeline tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use smartfield_core::{ConfigStore, Provider, ProviderConfig, TaskKind, TaskTemplate};

use crate::provider::{CompletionProvider, CompletionRequest, ProviderError, Role};

enum Script {
    Replies(Mutex<VecDeque<String>>),
    Fail(ProviderError),
    /// Echo the user text back tagged with the task named in the system prompt.
    Tag,
}

/// A provider that follows a script and records every request.
pub(crate) struct ScriptedProvider {
    script: Script,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub(crate) fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_script(Script::Replies(Mutex::new(
            replies.into_iter().map(Into::into).collect(),
        )))
    }

    pub(crate) fn failing(error: ProviderError) -> Self {
        Self::with_script(Script::Fail(error))
    }

    pub(crate) fn tagging() -> Self {
        Self::with_script(Script::Tag)
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Task tags of the recorded calls, in call order.
    pub(crate) fn called_tasks(&self) -> Vec<String> {
        self.calls().iter().map(task_tag).collect()
    }
}

fn task_tag(request: &CompletionRequest) -> String {
    let system = request.content(Role::System).unwrap_or_default();
    system
        .strip_prefix('[')
        .and_then(|s| s.split_once(']'))
        .map(|(tag, _)| tag.to_string())
        .unwrap_or_default()
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(request.clone());
        match &self.script {
            Script::Replies(replies) => replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ProviderError::MalformedResponse("script exhausted".into())),
            Script::Fail(e) => Err(e.clone()),
            Script::Tag => {
                let user = request.content(Role::User).unwrap_or_default();
                let input = user.strip_prefix("Text: ").unwrap_or(user);
                Ok(format!("Text: {input}\nResult: {input}|{}", task_tag(request)))
            }
        }
    }
}

/// One OpenAI configuration covering every task.
///
/// System prompts start with `[<task>]` so stubs can tell the stages apart.
pub(crate) fn test_store() -> ConfigStore {
    let tasks: BTreeMap<String, TaskTemplate> = TaskKind::ALL
        .into_iter()
        .map(|task| {
            let system = match task {
                TaskKind::Translate => "[translate] language_1 -> language_2.".to_string(),
                other => format!("[{other}] default_language."),
            };
            let template = TaskTemplate {
                model: "test-model".into(),
                system,
                user: "Text: original_text".into(),
                result_format_rules: " Reply as 'Result: <text>'.".into(),
                default_result_key: "NO_RESULT".into(),
            };
            (task.as_str().to_string(), template)
        })
        .collect();

    let mut store = ConfigStore::new();
    store
        .insert(ProviderConfig {
            name: "test-OpenAI".into(),
            provider: Provider::OpenAi,
            model: "test-model".into(),
            tasks,
        })
        .unwrap();
    store
}
