//! Ingestion processor
//!
//! Core import logic: load the corpus, embed passages in batches, and store
//! them keyed by content hash so re-running an import is a no-op.

use crate::errors::IngestionError;
use async_trait::async_trait;
use ragstream_common::corpus::{self, CorpusRecord};
use ragstream_common::db::{NewPassage, Repository};
use ragstream_common::embeddings::Embedder;
use ragstream_common::errors::Result as AppResult;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Where embedded passages end up
#[async_trait]
pub trait PassageStore: Send + Sync {
    async fn ensure_schema(&self, dimension: usize) -> AppResult<()>;

    /// Rows actually inserted; duplicates are skipped
    async fn insert(&self, passages: &[NewPassage], embedding_model: &str) -> AppResult<u64>;

    async fn count(&self) -> AppResult<i64>;
}

#[async_trait]
impl PassageStore for Repository {
    async fn ensure_schema(&self, dimension: usize) -> AppResult<()> {
        Repository::ensure_schema(self, dimension).await
    }

    async fn insert(&self, passages: &[NewPassage], embedding_model: &str) -> AppResult<u64> {
        self.insert_passages(passages, embedding_model).await
    }

    async fn count(&self) -> AppResult<i64> {
        self.count_passages().await
    }
}

/// Counts for one import run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    /// Records left after cleaning and de-duplication
    pub records: usize,
    pub inserted: u64,
    /// Already stored from an earlier run
    pub skipped: u64,
    pub batches: usize,
    /// Passages in the store after the run
    pub stored: i64,
}

/// Ingestion processor
pub struct IngestionProcessor {
    store: Arc<dyn PassageStore>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl IngestionProcessor {
    pub fn new(store: Arc<dyn PassageStore>, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Import a corpus file or directory
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn process_path(&self, path: &Path) -> Result<IngestionReport, IngestionError> {
        if !path.exists() {
            return Err(IngestionError::SourceNotFound(path.display().to_string()));
        }

        let records = corpus::load_corpus(path).await?;
        self.process_records(records).await
    }

    /// Import already prepared records
    pub async fn process_records(
        &self,
        records: Vec<CorpusRecord>,
    ) -> Result<IngestionReport, IngestionError> {
        let mut report = IngestionReport {
            records: records.len(),
            ..IngestionReport::default()
        };

        if records.is_empty() {
            warn!("Corpus is empty, nothing to import");
            report.stored = self.store.count().await.unwrap_or(0);
            return Ok(report);
        }

        self.store.ensure_schema(self.embedder.dimension()).await?;
        let model = self.embedder.model_name().to_string();

        for (batch_no, batch) in records.chunks(self.batch_size).enumerate() {
            let passages = self.embed_batch(batch).await?;
            let inserted = self.store.insert(&passages, &model).await?;

            report.inserted += inserted;
            report.skipped += passages.len() as u64 - inserted.min(passages.len() as u64);
            report.batches += 1;

            info!(
                batch = batch_no + 1,
                size = passages.len(),
                inserted,
                "Batch stored"
            );
        }

        report.stored = self.store.count().await?;
        info!(
            records = report.records,
            inserted = report.inserted,
            skipped = report.skipped,
            stored = report.stored,
            "Ingestion complete"
        );
        Ok(report)
    }

    async fn embed_batch(&self, batch: &[CorpusRecord]) -> Result<Vec<NewPassage>, IngestionError> {
        let texts: Vec<String> = batch.iter().map(|r| r.embedding_text()).collect();
        let vectors = self.embedder.embed_passages(&texts).await?;

        if vectors.len() != batch.len() {
            return Err(IngestionError::EmbeddingError(format!(
                "Embedded {} of {} passages",
                vectors.len(),
                batch.len()
            )));
        }

        let dimension = self.embedder.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(IngestionError::EmbeddingError(format!(
                "Embedding has {} dimensions, expected {}",
                bad.len(),
                dimension
            )));
        }

        Ok(batch
            .iter()
            .zip(vectors)
            .map(|(record, embedding)| NewPassage {
                title: record.title.clone(),
                content: record.content.clone(),
                content_hash: record.content_hash(),
                embedding,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragstream_common::embeddings::MockEmbedder;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Store keyed by content hash, like the real unique index
    #[derive(Default)]
    struct MemoryStore {
        hashes: Mutex<HashSet<String>>,
        schema_dimension: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl PassageStore for MemoryStore {
        async fn ensure_schema(&self, dimension: usize) -> AppResult<()> {
            *self.schema_dimension.lock().unwrap() = Some(dimension);
            Ok(())
        }

        async fn insert(&self, passages: &[NewPassage], _embedding_model: &str) -> AppResult<u64> {
            let mut hashes = self.hashes.lock().unwrap();
            Ok(passages
                .iter()
                .filter(|p| hashes.insert(p.content_hash.clone()))
                .count() as u64)
        }

        async fn count(&self) -> AppResult<i64> {
            Ok(self.hashes.lock().unwrap().len() as i64)
        }
    }

    fn processor(store: Arc<MemoryStore>, batch_size: usize) -> IngestionProcessor {
        IngestionProcessor::new(store, Arc::new(MockEmbedder::new(32)), batch_size)
    }

    fn records() -> Vec<CorpusRecord> {
        corpus::prepare(vec![
            CorpusRecord::new("Working Hours", "Open 10am to 5pm."),
            CorpusRecord::new("Contact Info", "Call the front desk."),
            CorpusRecord::new("Passport", "Apply online."),
        ])
    }

    #[tokio::test]
    async fn test_import_in_batches() {
        let store = Arc::new(MemoryStore::default());
        let report = processor(store.clone(), 2).process_records(records()).await.unwrap();

        assert_eq!(
            report,
            IngestionReport {
                records: 3,
                inserted: 3,
                skipped: 0,
                batches: 2,
                stored: 3,
            }
        );
        assert_eq!(*store.schema_dimension.lock().unwrap(), Some(32));
    }

    #[tokio::test]
    async fn test_reimport_skips_existing() {
        let store = Arc::new(MemoryStore::default());
        let processor = processor(store, 10);

        processor.process_records(records()).await.unwrap();
        let second = processor.process_records(records()).await.unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 3);
        assert_eq!(second.stored, 3);
    }

    #[tokio::test]
    async fn test_empty_corpus_is_not_an_error() {
        let store = Arc::new(MemoryStore::default());
        let report = processor(store.clone(), 10).process_records(vec![]).await.unwrap();

        assert_eq!(report.inserted, 0);
        assert_eq!(report.batches, 0);
        assert!(store.schema_dimension.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_source() {
        let store = Arc::new(MemoryStore::default());
        let result = processor(store, 10)
            .process_path(Path::new("/definitely/not/here.json"))
            .await;
        assert!(matches!(result, Err(IngestionError::SourceNotFound(_))));
    }

    #[tokio::test]
    async fn test_import_from_file() {
        let path = std::env::temp_dir().join(format!("ragstream-ingest-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"[{"title": "Working Hours", "content": "Open 10am to 5pm."},
                {"title": "Working Hours", "content": "Open 10am to 5pm."},
                {"title": "Blank", "content": "   "}]"#,
        )
        .await
        .unwrap();

        let store = Arc::new(MemoryStore::default());
        let report = processor(store, 10).process_path(&path).await;
        tokio::fs::remove_file(&path).await.unwrap();

        let report = tokio_test::assert_ok!(report);
        assert_eq!(report.records, 1);
        assert_eq!(report.inserted, 1);
    }
}
