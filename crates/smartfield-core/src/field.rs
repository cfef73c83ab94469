//! Derived-field declarations.
//!
//! A derived field names the source fields it reads and the stages that turn
//! their text into its value. Stages always run in the order
//! spell-correct → summarize → translate → emojify.
//!
//! A field is either plain text (the pipeline output) or a title generated
//! from the pipeline output. Image thumbnails and audio transcription are
//! recognised in declarations but rejected: records only hold text.

use serde::{Deserialize, Serialize};

use crate::{DeclarationError, Provider, TaskKind};

/// Declaration surface of a derived field, as written by schema authors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFieldDecl {
    pub data_fields: Vec<String>,
    #[serde(default)]
    pub spell_correct: bool,
    #[serde(default)]
    pub translate: bool,
    #[serde(default)]
    pub target_lang: Option<String>,
    #[serde(default)]
    pub summarize: bool,
    #[serde(default)]
    pub emojify: bool,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub generate_title: bool,
    #[serde(default)]
    pub max_title_length: Option<usize>,
    #[serde(default)]
    pub thumbnail: bool,
    #[serde(default)]
    pub transcribe: bool,
}

/// What a derived field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FieldKind {
    /// The stage pipeline's output.
    #[default]
    Text,
    /// A title generated from the pipeline output, cut to `max_length` characters.
    Title { max_length: Option<usize> },
}

/// A validated derived-field specification. Immutable once declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedFieldSpec {
    source_fields: Vec<String>,
    spell_correct: bool,
    summarize: bool,
    translate: bool,
    emojify: bool,
    target_language: Option<String>,
    provider: Provider,
    kind: FieldKind,
}

impl DerivedFieldSpec {
    /// Validate a declaration.
    ///
    /// Fails with [`DeclarationError::InvalidDeclaration`] when `translate` is
    /// enabled without a (non-blank) `target_lang`.
    pub fn declare(decl: DerivedFieldDecl) -> Result<Self, DeclarationError> {
        if decl.data_fields.is_empty() {
            return Err(DeclarationError::NoSourceFields);
        }
        if decl.thumbnail {
            return Err(DeclarationError::UnsupportedKind("thumbnail"));
        }
        if decl.transcribe {
            return Err(DeclarationError::UnsupportedKind("transcribe"));
        }

        let kind = match (decl.generate_title, decl.max_title_length) {
            (_, Some(0)) => return Err(DeclarationError::ZeroTitleLength),
            (false, Some(_)) => return Err(DeclarationError::TitleLengthWithoutTitle),
            (true, max_length) => FieldKind::Title { max_length },
            (false, None) => FieldKind::Text,
        };

        let target_language = decl
            .target_lang
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        if decl.translate && target_language.is_none() {
            return Err(DeclarationError::InvalidDeclaration);
        }

        Ok(Self {
            source_fields: decl.data_fields,
            spell_correct: decl.spell_correct,
            summarize: decl.summarize,
            translate: decl.translate,
            emojify: decl.emojify,
            target_language,
            provider: decl.provider,
            kind,
        })
    }

    /// Start a declaration reading the given source fields.
    pub fn builder<I, S>(data_fields: I) -> DerivedFieldBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DerivedFieldBuilder {
            decl: DerivedFieldDecl {
                data_fields: data_fields.into_iter().map(Into::into).collect(),
                ..Default::default()
            },
        }
    }

    pub fn source_fields(&self) -> &[String] {
        &self.source_fields
    }

    pub fn target_language(&self) -> Option<&str> {
        self.target_language.as_deref()
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn is_enabled(&self, task: TaskKind) -> bool {
        match task {
            TaskKind::SpellCorrect => self.spell_correct,
            TaskKind::Summarize => self.summarize,
            TaskKind::Translate => self.translate,
            TaskKind::Emojify => self.emojify,
            TaskKind::GenerateTitle => matches!(self.kind, FieldKind::Title { .. }),
        }
    }

    /// Whether computing this field contacts a provider at all.
    pub fn calls_provider(&self) -> bool {
        self.kind != FieldKind::Text || !self.enabled_stages().is_empty()
    }

    /// Enabled stages, in pipeline order.
    pub fn enabled_stages(&self) -> Vec<TaskKind> {
        TaskKind::PIPELINE_ORDER
            .into_iter()
            .filter(|t| self.is_enabled(*t))
            .collect()
    }

    /// Back to the declaration form (for serialising a schema).
    pub fn to_decl(&self) -> DerivedFieldDecl {
        DerivedFieldDecl {
            data_fields: self.source_fields.clone(),
            spell_correct: self.spell_correct,
            translate: self.translate,
            target_lang: self.target_language.clone(),
            summarize: self.summarize,
            emojify: self.emojify,
            provider: self.provider,
            generate_title: matches!(self.kind, FieldKind::Title { .. }),
            max_title_length: match self.kind {
                FieldKind::Title { max_length } => max_length,
                FieldKind::Text => None,
            },
            thumbnail: false,
            transcribe: false,
        }
    }
}

impl TryFrom<DerivedFieldDecl> for DerivedFieldSpec {
    type Error = DeclarationError;

    fn try_from(decl: DerivedFieldDecl) -> Result<Self, Self::Error> {
        Self::declare(decl)
    }
}

/// Builder for [`DerivedFieldSpec`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct DerivedFieldBuilder {
    decl: DerivedFieldDecl,
}

impl DerivedFieldBuilder {
    pub fn spell_correct(mut self) -> Self {
        self.decl.spell_correct = true;
        self
    }

    pub fn summarize(mut self) -> Self {
        self.decl.summarize = true;
        self
    }

    /// Enable translation into `target_lang`.
    pub fn translate_to(mut self, target_lang: impl Into<String>) -> Self {
        self.decl.translate = true;
        self.decl.target_lang = Some(target_lang.into());
        self
    }

    /// Set the raw `translate` flag without a target language.
    pub fn translate(mut self, enabled: bool) -> Self {
        self.decl.translate = enabled;
        self
    }

    pub fn target_lang(mut self, target_lang: impl Into<String>) -> Self {
        self.decl.target_lang = Some(target_lang.into());
        self
    }

    pub fn emojify(mut self) -> Self {
        self.decl.emojify = true;
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.decl.provider = provider;
        self
    }

    /// Make this a title field.
    pub fn generate_title(mut self) -> Self {
        self.decl.generate_title = true;
        self
    }

    pub fn max_title_length(mut self, max_length: usize) -> Self {
        self.decl.max_title_length = Some(max_length);
        self
    }

    pub fn build(self) -> Result<DerivedFieldSpec, DeclarationError> {
        DerivedFieldSpec::declare(self.decl)
    }
}
