//! Answer extraction from raw provider output.
//!
//! Providers are told to finish with a `Result: <answer>` line. Only the last
//! non-empty line is inspected. An answer containing the task's
//! `default_result_key` is the provider echoing its placeholder instead of
//! doing the work, and counts as no usable result.

/// Marker preceding the answer on the final line.
pub const RESULT_MARKER: &str = "Result:";
/// Marker preceding the echoed input.
pub const TEXT_MARKER: &str = "Text:";

/// How strictly the output markers are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerGate {
    /// Only `Result:` is looked for. Without it the final line is returned
    /// unchanged and the placeholder check is skipped.
    #[default]
    Lenient,
    /// `Text:` must appear in the output and `Result:` on the final line;
    /// anything else is no usable result.
    Strict,
}

/// Extract the answer from `raw`, or `None` when there is no usable result.
///
/// An empty `default_result_key` disables the placeholder check, so every
/// `Result:` answer is accepted. Matching the empty string as a substring
/// would instead reject every answer and make the stage always fall back.
pub fn extract(raw: &str, default_result_key: &str, gate: MarkerGate) -> Option<String> {
    let last = raw
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");

    let Some(pos) = last.find(RESULT_MARKER) else {
        return match gate {
            MarkerGate::Lenient => Some(last.to_string()),
            MarkerGate::Strict => None,
        };
    };

    if gate == MarkerGate::Strict && !raw.contains(TEXT_MARKER) {
        return None;
    }

    let answer = last[pos + RESULT_MARKER.len()..].trim();
    if is_placeholder(answer, default_result_key) {
        return None;
    }
    Some(answer.to_string())
}

/// Case-insensitive placeholder check. An empty key never matches.
fn is_placeholder(answer: &str, default_result_key: &str) -> bool {
    !default_result_key.is_empty()
        && answer
            .to_lowercase()
            .contains(&default_result_key.to_lowercase())
}
