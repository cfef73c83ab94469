//! Core types: providers, task names, provider configuration, derived-field
//! declarations, and record schemas.

pub mod config;
mod error;
pub mod field;
pub mod provider;
pub mod schema;
pub mod task;

pub use config::{ConfigStore, ProviderConfig, TaskTemplate};
pub use error::{ConfigError, DeclarationError, SchemaError, UnknownProvider};
pub use field::{DerivedFieldBuilder, DerivedFieldDecl, DerivedFieldSpec, FieldKind};
pub use provider::Provider;
pub use schema::{DerivedField, DerivedValues, Record, RecordType, RecordTypeDecl};
pub use task::TaskKind;
