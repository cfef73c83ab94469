//! Title fields.
//!
//! A title field runs its enabled stages as usual, then asks the provider for
//! a title of the resulting text and cuts it to the declared maximum length.

use smartfield_core::{Provider, TaskKind};

use crate::stage::{StageError, StageOutcome, StageRunner};

/// Generate a title for `text`, at most `max_length` characters.
///
/// A degenerate answer falls back to `text` itself, which is then cut like
/// any other title.
pub async fn generate(
    stages: &StageRunner,
    provider: Provider,
    text: &str,
    max_length: Option<usize>,
) -> Result<StageOutcome, StageError> {
    let mut outcome = stages
        .run_stage(TaskKind::GenerateTitle, provider, text, None)
        .await?;
    outcome.output = truncate(&outcome.output, max_length);
    Ok(outcome)
}

/// Cut `title` to at most `max_length` characters, preferring a word boundary.
pub fn truncate(title: &str, max_length: Option<usize>) -> String {
    let Some(max) = max_length else {
        return title.to_string();
    };
    if title.chars().count() <= max {
        return title.to_string();
    }

    let cut: String = title.chars().take(max).collect();
    let at_boundary = title.chars().nth(max).is_some_and(char::is_whitespace);
    let kept = match cut.rfind(char::is_whitespace) {
        Some(i) if !at_boundary && i > 0 => &cut[..i],
        _ => cut.as_str(),
    };
    kept.trim_end().to_string()
}
