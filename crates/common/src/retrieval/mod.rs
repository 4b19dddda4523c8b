//! Passage retrieval
//!
//! The query path only sees the [`VectorIndex`] trait. Two backends:
//! - pgvector (passages imported by the `ingest` binary)
//! - in-memory brute-force cosine over a corpus file embedded at start-up

mod memory;
mod pgvector;

pub use memory::MemoryIndex;
pub use pgvector::PgVectorIndex;

use crate::errors::Result;
use serde::{Deserialize, Serialize};

/// One passage returned by a search. Its rank is its position in the
/// returned sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub title: String,
    pub content: String,
}

impl RetrievedPassage {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self { title: title.into(), content: content.into() }
    }
}

/// Similarity search over the corpus. Shared read-only across connections.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` passages, most similar first
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>>;

    /// Readiness probe
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;
}
