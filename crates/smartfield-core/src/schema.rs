//! Record type declarations and their Arrow schemas.
//!
//! A [`RecordType`] names its plain text fields and its derived fields
//! explicitly, so the materializer never has to discover them at runtime.
//! Every column is nullable `Utf8`; an unset derived field is stored as null.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, LargeStringArray, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::{DerivedFieldDecl, DerivedFieldSpec, SchemaError};

/// Values computed for the derived fields of one record, keyed by field name.
pub type DerivedValues = BTreeMap<String, Option<String>>;

/// A derived field of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedField {
    pub name: String,
    pub spec: DerivedFieldSpec,
}

/// Serialisable declaration of a record type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTypeDecl {
    pub name: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub derived: Vec<DerivedFieldEntry>,
}

/// One derived field inside a [`RecordTypeDecl`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedFieldEntry {
    pub name: String,
    #[serde(flatten)]
    pub decl: DerivedFieldDecl,
}

/// A validated record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    name: String,
    fields: Vec<String>,
    derived: Vec<DerivedField>,
}

impl RecordType {
    /// Declare a record type with the given plain fields and no derived fields.
    ///
    /// The name doubles as a storage file name, so it may not be empty or
    /// contain `/`, `\` or `..`.
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let path_like = name.contains(|c: char| c == '/' || c == '\\') || name.contains("..");
        if name.trim().is_empty() || path_like {
            return Err(SchemaError::InvalidName(name));
        }

        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for f in &fields {
            if !seen.insert(f.as_str()) {
                return Err(SchemaError::DuplicateField(f.clone()));
            }
        }
        Ok(Self {
            name,
            fields,
            derived: Vec::new(),
        })
    }

    /// Add a derived field.
    ///
    /// Its source fields must be plain fields of this type, and its name must
    /// not clash with any existing field.
    pub fn with_derived(
        mut self,
        name: impl Into<String>,
        spec: DerivedFieldSpec,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(SchemaError::DuplicateField(name));
        }
        for source in spec.source_fields() {
            if !self.fields.contains(source) {
                return Err(SchemaError::UnknownSourceField {
                    field: name,
                    source_field: source.clone(),
                });
            }
        }
        self.derived.push(DerivedField { name, spec });
        Ok(self)
    }

    /// Validate a serialised declaration.
    pub fn declare(decl: RecordTypeDecl) -> Result<Self, SchemaError> {
        let mut record_type = Self::new(decl.name, decl.fields)?;
        for entry in decl.derived {
            let spec =
                DerivedFieldSpec::declare(entry.decl).map_err(|source| SchemaError::Declaration {
                    field: entry.name.clone(),
                    source,
                })?;
            record_type = record_type.with_derived(entry.name, spec)?;
        }
        Ok(record_type)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plain (author-supplied) fields, in declared order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Derived fields, in declared order.
    pub fn derived(&self) -> &[DerivedField] {
        &self.derived
    }

    fn has_column(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name) || self.derived.iter().any(|d| d.name == name)
    }

    /// Column names: plain fields first, then derived fields.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(String::as_str)
            .chain(self.derived.iter().map(|d| d.name.as_str()))
    }

    /// Arrow schema for records of this type.
    pub fn arrow_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .column_names()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect();
        Arc::new(Schema::new(fields))
    }
}

/// One record: field name → text value (`None` = null/unset).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, Option<String>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: Option<String>) {
        self.values.insert(field.into(), value);
    }

    /// Value of `field`, or `None` when missing or null.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(|v| v.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

/// Build a RecordBatch from records and their precomputed derived values.
///
/// Plain columns come from the record; derived columns come from the
/// matching [`DerivedValues`] entry (missing = null).
pub fn records_to_batch(
    record_type: &RecordType,
    rows: &[(Record, DerivedValues)],
) -> Result<RecordBatch, SchemaError> {
    let mut columns: Vec<ArrayRef> = Vec::new();

    for field in record_type.fields() {
        let values: Vec<Option<&str>> = rows.iter().map(|(r, _)| r.get(field)).collect();
        columns.push(Arc::new(StringArray::from(values)));
    }

    for derived in record_type.derived() {
        let values: Vec<Option<&str>> = rows
            .iter()
            .map(|(_, d)| d.get(&derived.name).and_then(|v| v.as_deref()))
            .collect();
        columns.push(Arc::new(StringArray::from(values)));
    }

    Ok(RecordBatch::try_new(record_type.arrow_schema(), columns)?)
}

/// Read every row of a batch back into [`Record`]s (all columns included).
///
/// Handles both `Utf8` (StringArray) and `LargeUtf8` (LargeStringArray) columns.
pub fn batch_to_records(batch: &RecordBatch) -> Result<Vec<Record>, SchemaError> {
    let schema = batch.schema();
    let mut records = vec![Record::new(); batch.num_rows()];

    for (idx, field) in schema.fields().iter().enumerate() {
        let col = batch.column(idx);
        for (row, record) in records.iter_mut().enumerate() {
            let value = get_string(col.as_ref(), row)
                .ok_or_else(|| SchemaError::NotUtf8(field.name().clone()))?;
            record.set(field.name().clone(), value);
        }
    }

    Ok(records)
}

/// `Some(None)` for null, `Some(Some(_))` for a value, `None` if not a string column.
fn get_string(col: &dyn Array, row: usize) -> Option<Option<String>> {
    if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
        return Some((!arr.is_null(row)).then(|| arr.value(row).to_string()));
    }
    if let Some(arr) = col.as_any().downcast_ref::<LargeStringArray>() {
        return Some((!arr.is_null(row)).then(|| arr.value(row).to_string()));
    }
    None
}
