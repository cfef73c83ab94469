//! Derived-field materialization.
//!
//! Materialization is the "prepare" half of a two-phase save: compute every
//! derived value of a record, then hand the record plus those values to the
//! persistence layer. Nothing here decides whether the write happens.

use arrow::record_batch::RecordBatch;
use smartfield_core::schema::{batch_to_records, records_to_batch};
use smartfield_core::{DerivedFieldSpec, DerivedValues, Record, RecordType, SchemaError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::pipeline::PipelineRunner;
use crate::stage::StageError;

/// Joins the values of a derived field's source fields.
pub const SOURCE_SEPARATOR: &str = "\n";

/// What to do when a derived field's pipeline fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaterializePolicy {
    /// Leave the field unset and carry on with the save.
    #[default]
    BestEffort,
    /// Fail the prepare step with the stage error.
    Strict,
}

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("derived field '{field}': {source}")]
    Stage {
        field: String,
        #[source]
        source: StageError,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Computes derived field values for records of a declared type.
pub struct Materializer {
    pipeline: PipelineRunner,
    policy: MaterializePolicy,
}

impl Materializer {
    pub fn new(pipeline: PipelineRunner) -> Self {
        Self {
            pipeline,
            policy: MaterializePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MaterializePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Compute every derived field of `record`, in declared order.
    ///
    /// A field with no source text stays unset and its pipeline is not run.
    pub async fn prepare(
        &self,
        record_type: &RecordType,
        record: &Record,
    ) -> Result<DerivedValues, MaterializeError> {
        let mut values = DerivedValues::new();

        for derived in record_type.derived() {
            let value = match source_text(&derived.spec, record) {
                None => {
                    debug!(
                        record_type = record_type.name(),
                        field = %derived.name,
                        "no source text, leaving field unset"
                    );
                    None
                }
                Some(text) => match self.pipeline.run(&derived.spec, &text).await {
                    Ok(run) => Some(run.into_output()),
                    Err(source) if self.policy == MaterializePolicy::BestEffort => {
                        warn!(
                            record_type = record_type.name(),
                            field = %derived.name,
                            error = %source,
                            "derived field left unset"
                        );
                        None
                    }
                    Err(source) => {
                        return Err(MaterializeError::Stage {
                            field: derived.name.clone(),
                            source,
                        });
                    }
                },
            };
            values.insert(derived.name.clone(), value);
        }

        Ok(values)
    }

    /// Materialize every row of `batch`, one record at a time.
    ///
    /// Returns a batch with `record_type`'s schema: plain columns copied,
    /// derived columns filled.
    pub async fn prepare_batch(
        &self,
        record_type: &RecordType,
        batch: &RecordBatch,
    ) -> Result<RecordBatch, MaterializeError> {
        let records = batch_to_records(batch)?;
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let derived = self.prepare(record_type, &record).await?;
            rows.push((record, derived));
        }
        Ok(records_to_batch(record_type, &rows)?)
    }
}

/// Concatenate the set source values of `spec`, in declared order.
pub fn source_text(spec: &DerivedFieldSpec, record: &Record) -> Option<String> {
    let parts: Vec<&str> = spec
        .source_fields()
        .iter()
        .filter_map(|f| record.get(f))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(SOURCE_SEPARATOR))
    }
}
