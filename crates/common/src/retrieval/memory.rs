//! In-memory vector index
//!
//! Brute-force cosine similarity over every stored passage. Linear in corpus
//! size, which is fine for the few thousand passages of a single site.

use super::{RetrievedPassage, VectorIndex};
use crate::corpus::CorpusRecord;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use std::cmp::Ordering;
use std::sync::Arc;

struct Entry {
    passage: RetrievedPassage,
    vector: Vec<f32>,
}

/// Immutable after construction; safe to share across connections
pub struct MemoryIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<Entry>,
}

impl MemoryIndex {
    /// Embed every record and build the index
    pub async fn build(records: Vec<CorpusRecord>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let texts: Vec<String> = records.iter().map(|r| r.embedding_text()).collect();
        let vectors = embedder.embed_passages(&texts).await?;

        if vectors.len() != records.len() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "Embedded {} of {} corpus passages",
                    vectors.len(),
                    records.len()
                ),
            });
        }

        let entries = records
            .into_iter()
            .zip(vectors)
            .map(|(record, vector)| Entry {
                passage: RetrievedPassage::new(record.title, record.content),
                vector: normalize(vector),
            })
            .collect();

        Ok(Self { embedder, entries })
    }

    /// Number of vectors in the index
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-k by cosine similarity; ties keep corpus order
    fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedPassage>> {
        if let Some(entry) = self.entries.iter().find(|e| e.vector.len() != query.len()) {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "Query embedding has {} dimensions, index holds {}",
                    query.len(),
                    entry.vector.len()
                ),
            });
        }
        let query = normalize(query.to_vec());

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, dot(&entry.vector, &query)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, _)| self.entries[i].passage.clone())
            .collect())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = dot(&vector, &vector).sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        let embedding = self.embedder.embed_query(query).await?;
        self.nearest(&embedding, k)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;

    fn corpus() -> Vec<CorpusRecord> {
        vec![
            CorpusRecord::new("Contact Info", "Phone numbers and office contact details"),
            CorpusRecord::new("Working Hours", "Office hours are 10am to 5pm on weekdays"),
            CorpusRecord::new("Passport", "Passport verification takes two weeks"),
        ]
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let index = MemoryIndex::build(corpus(), Arc::new(MockEmbedder::new(512)))
            .await
            .unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search("office hours weekdays", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Working Hours");
    }

    #[tokio::test]
    async fn test_search_bounded_by_k_and_corpus() {
        let index = MemoryIndex::build(corpus(), Arc::new(MockEmbedder::new(64)))
            .await
            .unwrap();
        assert_eq!(index.search("anything", 15).await.unwrap().len(), 3);
        assert!(index.search("anything", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = MemoryIndex::build(vec![], Arc::new(MockEmbedder::new(64)))
            .await
            .unwrap();
        assert!(index.is_empty());
        assert!(index.search("office hours", 15).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_an_error() {
        let index = MemoryIndex::build(corpus(), Arc::new(MockEmbedder::new(64)))
            .await
            .unwrap();

        let result = index.nearest(&[1.0; 32], 15);
        assert!(matches!(result, Err(AppError::EmbeddingError { .. })));
    }
}
