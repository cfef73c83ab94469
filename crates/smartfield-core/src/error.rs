use std::path::PathBuf;

use thiserror::Error;

use crate::Provider;

/// Errors raised while loading or querying the [`ConfigStore`](crate::ConfigStore).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration for task '{task}' under provider {provider}")]
    ConfigNotFound { provider: Provider, task: String },

    #[error(
        "task '{task}' for provider {provider} is declared by both '{existing}' and '{incoming}'"
    )]
    DuplicateTask {
        provider: Provider,
        task: String,
        existing: String,
        incoming: String,
    },

    #[error("unknown provider code: {0}")]
    UnknownProvider(String),

    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised when a derived field is declared.
///
/// These surface when the record type is defined, before any record is saved.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("value for 'target_lang' has to be specified when translate=true")]
    InvalidDeclaration,

    #[error("'data_fields' must name at least one source field")]
    NoSourceFields,

    #[error("'max_title_length' is only valid with generate_title=true")]
    TitleLengthWithoutTitle,

    #[error("'max_title_length' must be at least 1")]
    ZeroTitleLength,

    #[error("'{0}' fields are not supported: records hold text only")]
    UnsupportedKind(&'static str),
}

/// A provider code that matches none of the known providers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown provider code: {0}")]
pub struct UnknownProvider(pub String);

/// Errors raised when a record type is declared or records are converted.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("derived field '{field}' reads unknown source field '{source_field}'")]
    UnknownSourceField { field: String, source_field: String },

    #[error("invalid record type name '{0}': must be non-empty without path separators or '..'")]
    InvalidName(String),

    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),

    #[error("derived field '{field}': {source}")]
    Declaration {
        field: String,
        #[source]
        source: DeclarationError,
    },

    #[error("column '{0}' is not a string column")]
    NotUtf8(String),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}
