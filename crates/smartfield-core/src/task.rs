use std::fmt;

use serde::{Deserialize, Serialize};

/// A task the derived-field pipeline knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    SpellCorrect,
    Summarize,
    Translate,
    Emojify,
    /// Title generation for title fields. Never part of the stage pipeline.
    GenerateTitle,
}

impl TaskKind {
    /// Fixed order in which enabled stages run on a derived field.
    pub const PIPELINE_ORDER: [TaskKind; 4] = [
        TaskKind::SpellCorrect,
        TaskKind::Summarize,
        TaskKind::Translate,
        TaskKind::Emojify,
    ];

    /// Every task, pipeline stages first.
    pub const ALL: [TaskKind; 5] = [
        TaskKind::SpellCorrect,
        TaskKind::Summarize,
        TaskKind::Translate,
        TaskKind::Emojify,
        TaskKind::GenerateTitle,
    ];

    /// Task name as it appears under `tasks` in provider configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpellCorrect => "spell_correct",
            Self::Summarize => "summarize",
            Self::Translate => "translate",
            Self::Emojify => "emojify",
            Self::GenerateTitle => "generate_title",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_serde() {
        for task in TaskKind::ALL {
            let json = serde_json::to_string(&task).unwrap();
            assert_eq!(json, format!("\"{}\"", task.as_str()));
        }
    }

    #[test]
    fn title_is_not_a_pipeline_stage() {
        assert!(!TaskKind::PIPELINE_ORDER.contains(&TaskKind::GenerateTitle));
    }
}
