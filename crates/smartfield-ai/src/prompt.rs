//! Prompt templating.
//!
//! Templates are plain strings with literal placeholder tokens; rendering is
//! pure substitution. Language placeholders are filled before the verbatim
//! text, so input text containing a token is left untouched.

use smartfield_core::{TaskKind, TaskTemplate};
use thiserror::Error;

use crate::provider::{CompletionRequest, Role};

/// Source language placeholder in translate templates.
pub const SOURCE_LANGUAGE_TOKEN: &str = "language_1";
/// Target language placeholder in translate templates.
pub const TARGET_LANGUAGE_TOKEN: &str = "language_2";
/// Source language placeholder in all other templates.
pub const DEFAULT_LANGUAGE_TOKEN: &str = "default_language";
/// Verbatim input text placeholder (user templates).
pub const TEXT_TOKEN: &str = "original_text";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("task '{0}' needs a target language")]
    MissingTargetLanguage(TaskKind),
}

/// Render the `role` template of `template` for `task`.
///
/// The system rendering always ends with `result_format_rules`. The verbatim
/// `text` is substituted into the user rendering only.
pub fn render(
    template: &TaskTemplate,
    role: Role,
    task: TaskKind,
    source_language: &str,
    target_language: Option<&str>,
    text: &str,
) -> Result<String, PromptError> {
    let raw = match role {
        Role::System => &template.system,
        Role::User => &template.user,
    };

    let mut rendered = match task {
        TaskKind::Translate => {
            let target = target_language.ok_or(PromptError::MissingTargetLanguage(task))?;
            raw.replace(SOURCE_LANGUAGE_TOKEN, &capitalize(source_language))
                .replace(TARGET_LANGUAGE_TOKEN, &capitalize(target))
        }
        _ => raw.replace(DEFAULT_LANGUAGE_TOKEN, &capitalize(source_language)),
    };

    match role {
        Role::System => rendered.push_str(&template.result_format_rules),
        Role::User => rendered = rendered.replace(TEXT_TOKEN, text),
    }

    Ok(rendered)
}

/// Render both messages of a provider call for `task`.
pub fn build_request(
    template: &TaskTemplate,
    task: TaskKind,
    source_language: &str,
    target_language: Option<&str>,
    text: &str,
) -> Result<CompletionRequest, PromptError> {
    let system = render(template, Role::System, task, source_language, target_language, text)?;
    let user = render(template, Role::User, task, source_language, target_language, text)?;
    Ok(CompletionRequest::new(template.model.clone(), system, user))
}

/// Upper-case the first character and lower-case the rest ("kANNADA" → "Kannada").
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
