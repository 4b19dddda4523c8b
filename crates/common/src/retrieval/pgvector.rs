//! Vector similarity search using pgvector

use super::{RetrievedPassage, VectorIndex};
use crate::db::Repository;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use std::sync::Arc;

/// Vector index backed by the `passages` table
pub struct PgVectorIndex {
    repository: Repository,
    embedder: Arc<dyn Embedder>,
}

impl PgVectorIndex {
    /// Create a new pgvector index
    pub fn new(repository: Repository, embedder: Arc<dyn Embedder>) -> Self {
        Self { repository, embedder }
    }
}

#[async_trait::async_trait]
impl VectorIndex for PgVectorIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        let embedding = self.embedder.embed_query(query).await?;

        let rows = self.repository
            .nearest_passages(&embedding, k)
            .await
            .map_err(|e| AppError::RetrievalError {
                message: format!("Vector search failed: {}", e),
            })?;

        tracing::debug!(
            results = rows.len(),
            best_score = rows.first().map(|r| r.score),
            "pgvector search completed"
        );

        Ok(rows
            .into_iter()
            .map(|row| RetrievedPassage::new(row.title, row.content))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        self.repository.ping().await
    }

    fn backend(&self) -> &'static str {
        "pgvector"
    }
}
