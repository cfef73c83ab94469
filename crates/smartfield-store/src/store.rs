//! Record store: one table of Arrow batches per registered record type.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::ArrayRef;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use smartfield_core::schema::{batch_to_records, records_to_batch};
use smartfield_core::{DerivedValues, Record, RecordType};
use tracing::{debug, info};

use crate::StoreError;

struct Table {
    record_type: RecordType,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    fn rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }
}

/// Stores records together with their precomputed derived values.
///
/// Use [`open`](Self::open) for an in-memory store and
/// [`open_persistent`](Self::open_persistent) for a directory holding one
/// `<type>.parquet` file per record type. The file is rewritten on every save.
pub struct RecordStore {
    dir: Option<PathBuf>,
    tables: HashMap<String, Table>,
}

impl RecordStore {
    /// Open an in-memory store.
    pub fn open() -> Self {
        Self {
            dir: None,
            tables: HashMap::new(),
        }
    }

    /// Open or create a persistent store in `dir`.
    pub fn open_persistent(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            tables: HashMap::new(),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.dir.is_some()
    }

    /// Register a record type, loading its existing Parquet file if any.
    ///
    /// Registering a type again is a no-op when its columns are unchanged.
    pub fn register(&mut self, record_type: RecordType) -> Result<(), StoreError> {
        let name = record_type.name().to_string();
        let schema = record_type.arrow_schema();

        if let Some(existing) = self.tables.get(&name) {
            if existing.schema.fields() != schema.fields() {
                return Err(StoreError::SchemaMismatch {
                    record_type: name,
                    detail: "already registered with different columns".into(),
                });
            }
            return Ok(());
        }

        let mut batches = Vec::new();
        if let Some(path) = self.table_path(&name)
            && path.exists()
        {
            for batch in read_parquet(&path)? {
                batches.push(conform(&name, &schema, &batch)?);
            }
            info!(
                record_type = %name,
                rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
                path = %path.display(),
                "loaded record table"
            );
        }

        self.tables.insert(
            name,
            Table {
                record_type,
                schema,
                batches,
            },
        );
        Ok(())
    }

    pub fn record_type(&self, type_name: &str) -> Option<&RecordType> {
        self.tables.get(type_name).map(|t| &t.record_type)
    }

    /// Names of the registered record types, sorted.
    pub fn record_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Save one record with its derived values.
    pub fn save(
        &mut self,
        type_name: &str,
        record: &Record,
        derived: &DerivedValues,
    ) -> Result<(), StoreError> {
        let table = self.table(type_name)?;
        let batch = records_to_batch(&table.record_type, &[(record.clone(), derived.clone())])?;
        self.save_batch(type_name, batch)
    }

    /// Append a batch. Its columns must match the record type's columns by
    /// name and type; column order may differ.
    ///
    /// For a persistent store the batch is only kept once the file write
    /// succeeds.
    pub fn save_batch(&mut self, type_name: &str, batch: RecordBatch) -> Result<(), StoreError> {
        let path = self.table_path(type_name);
        let table = self
            .tables
            .get_mut(type_name)
            .ok_or_else(|| StoreError::UnknownRecordType(type_name.to_string()))?;

        let batch = conform(type_name, &table.schema, &batch)?;
        let rows = batch.num_rows();
        table.batches.push(batch);

        // A failed write must not leave the batch visible in memory.
        if let Some(path) = path
            && let Err(e) = write_parquet(&path, &table.schema, &table.batches)
        {
            table.batches.pop();
            return Err(e);
        }
        debug!(record_type = type_name, rows, total = table.rows(), "saved batch");
        Ok(())
    }

    /// All stored records of `type_name`, derived columns included.
    pub fn records(&self, type_name: &str) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::new();
        for batch in &self.table(type_name)?.batches {
            records.extend(batch_to_records(batch)?);
        }
        Ok(records)
    }

    pub fn count(&self, type_name: &str) -> Result<usize, StoreError> {
        Ok(self.table(type_name)?.rows())
    }

    pub fn batches(&self, type_name: &str) -> Result<&[RecordBatch], StoreError> {
        Ok(&self.table(type_name)?.batches)
    }

    fn table(&self, type_name: &str) -> Result<&Table, StoreError> {
        self.tables
            .get(type_name)
            .ok_or_else(|| StoreError::UnknownRecordType(type_name.to_string()))
    }

    fn table_path(&self, type_name: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{type_name}.parquet")))
    }
}

/// Rebuild `batch` with `schema`'s column order, rejecting missing, extra or
/// mistyped columns.
fn conform(type_name: &str, schema: &SchemaRef, batch: &RecordBatch) -> Result<RecordBatch, StoreError> {
    let mismatch = |detail: String| StoreError::SchemaMismatch {
        record_type: type_name.to_string(),
        detail,
    };

    if batch.num_columns() != schema.fields().len() {
        return Err(mismatch(format!(
            "expected {} columns, got {}",
            schema.fields().len(),
            batch.num_columns()
        )));
    }

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let col = batch
            .column_by_name(field.name())
            .ok_or_else(|| mismatch(format!("missing column '{}'", field.name())))?;
        if col.data_type() != field.data_type() {
            return Err(mismatch(format!(
                "column '{}' is {}, expected {}",
                field.name(),
                col.data_type(),
                field.data_type()
            )));
        }
        columns.push(col.clone());
    }
    Ok(RecordBatch::try_new(schema.clone(), columns)?)
}

/// Read a Parquet file into Arrow RecordBatches.
pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let batches: Result<Vec<RecordBatch>, _> = reader.collect();
    Ok(batches?)
}

/// Replace `path` with `batches`, writing to a sibling file first.
fn write_parquet(path: &Path, schema: &SchemaRef, batches: &[RecordBatch]) -> Result<(), StoreError> {
    let tmp = path.with_extension("parquet.tmp");
    let file = File::create(&tmp)?;
    let mut writer = ArrowWriter::try_new(file, schema.clone(), None)?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::StringArray;
    use arrow::datatypes::{DataType, Field, Schema};
    use smartfield_core::DerivedFieldSpec;
    use tempfile::TempDir;

    use super::*;

    fn comment_type() -> RecordType {
        let spec = DerivedFieldSpec::builder(["text"])
            .translate_to("Kannada")
            .build()
            .unwrap();
        RecordType::new("comment", ["author", "text"])
            .unwrap()
            .with_derived("kannada_text", spec)
            .unwrap()
    }

    fn derived(value: Option<&str>) -> DerivedValues {
        DerivedValues::from([("kannada_text".to_string(), value.map(String::from))])
    }

    #[test]
    fn unknown_type_errors() {
        let store = RecordStore::open();
        assert!(matches!(
            store.count("missing"),
            Err(StoreError::UnknownRecordType(name)) if name == "missing"
        ));
    }

    #[test]
    fn save_and_read_back_in_memory() {
        let mut store = RecordStore::open();
        store.register(comment_type()).unwrap();

        let record = Record::new().with("author", "ana").with("text", "hello");
        store
            .save("comment", &record, &derived(Some("ಹಲೋ")))
            .unwrap();
        store
            .save("comment", &Record::new().with("author", "bo"), &derived(None))
            .unwrap();

        assert_eq!(store.count("comment").unwrap(), 2);
        let records = store.records("comment").unwrap();
        assert_eq!(records[0].get("text"), Some("hello"));
        assert_eq!(records[0].get("kannada_text"), Some("ಹಲೋ"));
        assert_eq!(records[1].get("text"), None);
        assert_eq!(records[1].get("kannada_text"), None);
        assert!(!store.is_persistent());
    }

    #[test]
    fn register_twice_is_a_no_op() {
        let mut store = RecordStore::open();
        store.register(comment_type()).unwrap();
        store
            .save("comment", &Record::new().with("text", "x"), &derived(None))
            .unwrap();
        store.register(comment_type()).unwrap();
        assert_eq!(store.count("comment").unwrap(), 1);
        assert_eq!(store.record_types(), ["comment"]);
    }

    #[test]
    fn register_conflicting_type_errors() {
        let mut store = RecordStore::open();
        store.register(comment_type()).unwrap();
        let other = RecordType::new("comment", ["body"]).unwrap();
        assert!(matches!(
            store.register(other),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn save_batch_reorders_columns() {
        let mut store = RecordStore::open();
        store.register(comment_type()).unwrap();

        let schema = Arc::new(Schema::new(vec![
            Field::new("kannada_text", DataType::Utf8, true),
            Field::new("text", DataType::Utf8, true),
            Field::new("author", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("k")])),
                Arc::new(StringArray::from(vec![Some("t")])),
                Arc::new(StringArray::from(vec![Some("a")])),
            ],
        )
        .unwrap();
        store.save_batch("comment", batch).unwrap();

        let stored = &store.batches("comment").unwrap()[0];
        assert_eq!(stored.schema().field(0).name(), "author");
        assert_eq!(store.records("comment").unwrap()[0].get("kannada_text"), Some("k"));
    }

    #[test]
    fn save_batch_rejects_missing_column() {
        let mut store = RecordStore::open();
        store.register(comment_type()).unwrap();

        let schema = Arc::new(Schema::new(vec![
            Field::new("author", DataType::Utf8, true),
            Field::new("text", DataType::Utf8, true),
            Field::new("other", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("a")])),
                Arc::new(StringArray::from(vec![Some("t")])),
                Arc::new(StringArray::from(vec![Some("o")])),
            ],
        )
        .unwrap();
        let err = store.save_batch("comment", batch).unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { .. }));
        assert_eq!(store.count("comment").unwrap(), 0);
    }

    #[test]
    fn save_batch_rejects_wrong_type() {
        let mut store = RecordStore::open();
        store
            .register(RecordType::new("note", ["n"]).unwrap())
            .unwrap();
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(arrow::array::Int64Array::from(vec![1]))],
        )
        .unwrap();
        assert!(matches!(
            store.save_batch("note", batch),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn persistent_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = RecordStore::open_persistent(dir.path()).unwrap();
            store.register(comment_type()).unwrap();
            store
                .save("comment", &Record::new().with("text", "one"), &derived(Some("1")))
                .unwrap();
            store
                .save("comment", &Record::new().with("text", "two"), &derived(None))
                .unwrap();
        }
        assert!(dir.path().join("comment.parquet").exists());
        assert!(!dir.path().join("comment.parquet.tmp").exists());

        let mut store = RecordStore::open_persistent(dir.path()).unwrap();
        store.register(comment_type()).unwrap();
        assert_eq!(store.count("comment").unwrap(), 2);
        let records = store.records("comment").unwrap();
        assert_eq!(records[0].get("kannada_text"), Some("1"));
        assert_eq!(records[1].get("text"), Some("two"));
        assert_eq!(records[1].get("kannada_text"), None);
    }

    #[test]
    fn failed_write_leaves_store_unchanged() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("comment.parquet.tmp");
        {
            let mut store = RecordStore::open_persistent(dir.path()).unwrap();
            store.register(comment_type()).unwrap();
            std::fs::create_dir(&blocker).unwrap();

            let err = store
                .save("comment", &Record::new().with("text", "lost"), &derived(None))
                .unwrap_err();
            assert!(matches!(err, StoreError::Io(_)));
            assert_eq!(store.count("comment").unwrap(), 0);
            assert!(store.records("comment").unwrap().is_empty());
        }
        std::fs::remove_dir(&blocker).unwrap();
        assert!(!dir.path().join("comment.parquet").exists());

        let mut store = RecordStore::open_persistent(dir.path()).unwrap();
        store.register(comment_type()).unwrap();
        assert_eq!(store.count("comment").unwrap(), 0);

        store
            .save("comment", &Record::new().with("text", "kept"), &derived(None))
            .unwrap();
        assert_eq!(store.count("comment").unwrap(), 1);
    }

    #[test]
    fn reopen_with_changed_type_errors() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = RecordStore::open_persistent(dir.path()).unwrap();
            store.register(comment_type()).unwrap();
            store
                .save("comment", &Record::new().with("text", "x"), &derived(None))
                .unwrap();
        }
        let mut store = RecordStore::open_persistent(dir.path()).unwrap();
        let changed = RecordType::new("comment", ["body"]).unwrap();
        assert!(matches!(
            store.register(changed),
            Err(StoreError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn read_missing_parquet_is_io_error() {
        let err = read_parquet(Path::new("/nonexistent/file.parquet")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
