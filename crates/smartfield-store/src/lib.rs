//! Storage layer: Arrow record batches per record type, in memory or backed
//! by one Parquet file per type.

mod error;
mod store;

pub use error::StoreError;
pub use store::{RecordStore, read_parquet};
