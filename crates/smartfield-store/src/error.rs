use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record type not registered: {0}")]
    UnknownRecordType(String),

    #[error("schema mismatch for record type '{record_type}': {detail}")]
    SchemaMismatch { record_type: String, detail: String },

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Schema(#[from] smartfield_core::SchemaError),
}
