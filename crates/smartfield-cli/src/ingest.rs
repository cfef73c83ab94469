//! Ingest pipeline: declare a record type, materialize each record's derived
//! fields, save into the record store, print the stored rows.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use smartfield_ai::{MaterializePolicy, Materializer, PipelineRunner};
use smartfield_core::schema::records_to_batch;
use smartfield_core::{Record, RecordType, RecordTypeDecl};
use smartfield_store::RecordStore;
use tracing::info;

pub struct IngestOptions<'a> {
    pub schema_path: &'a Path,
    pub records_path: &'a Path,
    pub db_dir: Option<&'a Path>,
    pub strict: bool,
}

pub struct IngestStats {
    pub record_type: String,
    pub ingested: usize,
    /// Derived values left unset across all ingested records.
    pub unset: usize,
}

pub fn load_record_type(path: &Path) -> anyhow::Result<RecordType> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading record type {}", path.display()))?;
    let decl: RecordTypeDecl = serde_json::from_str(&text)
        .with_context(|| format!("parsing record type {}", path.display()))?;
    RecordType::declare(decl).with_context(|| format!("declaring record type {}", path.display()))
}

pub fn load_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading records {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing records {}", path.display()))
}

/// Run the full ingest: prepare every record, then save them all with their
/// derived values in one batch.
pub async fn run_ingest(
    pipeline: PipelineRunner,
    opts: &IngestOptions<'_>,
) -> anyhow::Result<IngestStats> {
    let start = Instant::now();
    let record_type = load_record_type(opts.schema_path)?;
    let records = load_records(opts.records_path)?;
    eprintln!(
        "  Read {} record(s) of type '{}' from {}",
        records.len(),
        record_type.name(),
        opts.records_path.display()
    );

    let mut store = match opts.db_dir {
        Some(dir) => RecordStore::open_persistent(dir)
            .with_context(|| format!("opening record store {}", dir.display()))?,
        None => RecordStore::open(),
    };
    store
        .register(record_type.clone())
        .context("registering record type")?;

    let policy = if opts.strict {
        MaterializePolicy::Strict
    } else {
        MaterializePolicy::BestEffort
    };
    let materializer = Materializer::new(pipeline).with_policy(policy);

    let mut unset = 0usize;
    let mut rows = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        let derived = materializer
            .prepare(&record_type, &record)
            .await
            .with_context(|| format!("materializing record {idx}"))?;
        unset += derived.values().filter(|v| v.is_none()).count();
        rows.push((record, derived));
    }
    let ingested = rows.len();

    // One write per ingest: a persistent store rewrites its file on every save.
    if !rows.is_empty() {
        let batch = records_to_batch(&record_type, &rows).context("building record batch")?;
        store
            .save_batch(record_type.name(), batch)
            .context("saving records")?;
    }

    for row in store.records(record_type.name())? {
        println!("{}", serde_json::to_string(&row)?);
    }

    info!(
        record_type = record_type.name(),
        ingested,
        unset,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "ingest complete"
    );
    Ok(IngestStats {
        record_type: record_type.name().to_string(),
        ingested,
        unset,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use smartfield_ai::StageRunner;
    use smartfield_core::{ConfigStore, FieldKind, TaskKind};
    use tempfile::TempDir;

    use super::*;

    fn demos_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("demos")
    }

    #[test]
    fn demo_record_type_declares() {
        let record_type = load_record_type(&demos_dir().join("comment.json")).unwrap();
        assert_eq!(record_type.name(), "comment");
        let derived: Vec<&str> = record_type.derived().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(derived, ["kannada_text", "emojified_text"]);
        assert_eq!(
            record_type.derived()[0].spec.target_language(),
            Some("Kannada")
        );
    }

    #[test]
    fn demo_blog_declares_title_field() {
        let record_type = load_record_type(&demos_dir().join("blog.json")).unwrap();
        let title = &record_type.derived()[0];
        assert_eq!(title.name, "title");
        assert_eq!(
            title.spec.kind(),
            FieldKind::Title {
                max_length: Some(50)
            }
        );
        assert_eq!(title.spec.enabled_stages(), [TaskKind::SpellCorrect]);
    }

    #[test]
    fn demo_records_parse() {
        let records = load_records(&demos_dir().join("comments.json")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("text"), Some("helo wrld"));
    }

    #[test]
    fn invalid_declaration_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"name": "c", "fields": ["text"], "derived": [
                {"name": "t", "data_fields": ["text"], "translate": true}
            ]}"#,
        )
        .unwrap();
        let err = load_record_type(&path).unwrap_err();
        assert!(format!("{err:#}").contains("target_lang"));
    }

    /// No configuration and no adapters: every derived field stays unset,
    /// but records are still stored.
    #[tokio::test]
    async fn best_effort_ingest_without_providers() {
        let db = TempDir::new().unwrap();
        let pipeline = PipelineRunner::new(StageRunner::new(Arc::new(ConfigStore::new())));
        let schema_path = demos_dir().join("comment.json");
        let records_path = demos_dir().join("comments.json");
        let opts = IngestOptions {
            schema_path: &schema_path,
            records_path: &records_path,
            db_dir: Some(db.path()),
            strict: false,
        };

        let stats = run_ingest(pipeline, &opts).await.unwrap();
        assert_eq!(stats.ingested, 2);
        assert_eq!(stats.unset, 4);
        assert!(db.path().join("comment.parquet").exists());
    }

    #[tokio::test]
    async fn ingest_stores_all_records_in_one_batch() {
        let db = TempDir::new().unwrap();
        let pipeline = PipelineRunner::new(StageRunner::new(Arc::new(ConfigStore::new())));
        let schema_path = demos_dir().join("comment.json");
        let records_path = demos_dir().join("comments.json");
        let opts = IngestOptions {
            schema_path: &schema_path,
            records_path: &records_path,
            db_dir: Some(db.path()),
            strict: false,
        };
        run_ingest(pipeline, &opts).await.unwrap();

        let mut store = RecordStore::open_persistent(db.path()).unwrap();
        store
            .register(load_record_type(&schema_path).unwrap())
            .unwrap();
        assert_eq!(store.count("comment").unwrap(), 2);
        assert_eq!(store.batches("comment").unwrap().len(), 1);
        let stored = store.records("comment").unwrap();
        assert_eq!(stored[0].get("text"), Some("helo wrld"));
        assert_eq!(stored[0].get("kannada_text"), None);
    }

    #[tokio::test]
    async fn empty_records_file_writes_nothing() {
        let db = TempDir::new().unwrap();
        let records_path = db.path().join("none.json");
        std::fs::write(&records_path, "[]").unwrap();
        let pipeline = PipelineRunner::new(StageRunner::new(Arc::new(ConfigStore::new())));
        let schema_path = demos_dir().join("comment.json");
        let opts = IngestOptions {
            schema_path: &schema_path,
            records_path: &records_path,
            db_dir: Some(db.path()),
            strict: false,
        };
        let stats = run_ingest(pipeline, &opts).await.unwrap();
        assert_eq!(stats.ingested, 0);
        assert!(!db.path().join("comment.parquet").exists());
    }

    #[tokio::test]
    async fn strict_ingest_fails() {
        let pipeline = PipelineRunner::new(StageRunner::new(Arc::new(ConfigStore::new())));
        let schema_path = demos_dir().join("comment.json");
        let records_path = demos_dir().join("comments.json");
        let opts = IngestOptions {
            schema_path: &schema_path,
            records_path: &records_path,
            db_dir: None,
            strict: true,
        };
        assert!(run_ingest(pipeline, &opts).await.is_err());
    }
}
