//! Repository for passage storage
//!
//! Passages live in one pgvector-backed table. SeaORM does not model the
//! `vector` type, so everything touching embeddings goes through raw
//! statements with the vector passed as its text literal.

use crate::db::DbPool;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use serde::{Deserialize, Serialize};

/// A passage returned by similarity search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassageRow {
    pub title: String,
    pub content: String,
    pub score: f64,
}

/// A passage ready for insertion
#[derive(Debug, Clone)]
pub struct NewPassage {
    pub title: String,
    pub content: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    /// Create the extension and passages table if missing
    pub async fn ensure_schema(&self, dimension: usize) -> Result<()> {
        let conn = self.pool.conn();
        conn.execute_unprepared("CREATE EXTENSION IF NOT EXISTS vector").await?;
        conn.execute_unprepared(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS passages (
                id BIGSERIAL PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                embedding vector({}) NOT NULL,
                embedding_model TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            dimension
        ))
        .await?;
        Ok(())
    }

    /// Insert passages, skipping any whose content hash already exists.
    /// Returns the number of rows actually inserted.
    pub async fn insert_passages(&self, passages: &[NewPassage], embedding_model: &str) -> Result<u64> {
        let mut inserted = 0;

        for passage in passages {
            let stmt = Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                INSERT INTO passages (title, content, content_hash, embedding, embedding_model)
                VALUES ($1, $2, $3, $4::vector, $5)
                ON CONFLICT (content_hash) DO NOTHING
                "#,
                vec![
                    passage.title.clone().into(),
                    passage.content.clone().into(),
                    passage.content_hash.clone().into(),
                    vector_literal(&passage.embedding).into(),
                    embedding_model.into(),
                ],
            );

            inserted += self.pool.conn().execute(stmt).await?.rows_affected();
        }

        Ok(inserted)
    }

    /// Nearest passages by cosine distance, closest first
    pub async fn nearest_passages(&self, embedding: &[f32], limit: usize) -> Result<Vec<PassageRow>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                title,
                content,
                1 - (embedding <=> $1::vector) AS score
            FROM passages
            ORDER BY embedding <=> $1::vector, id
            LIMIT $2
            "#,
            vec![
                vector_literal(embedding).into(),
                (limit as i64).into(),
            ],
        );

        let rows = self.pool.conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(PassageRow {
                    title: row.try_get_by_index::<String>(0).ok()?,
                    content: row.try_get_by_index::<String>(1).ok()?,
                    score: row.try_get_by_index::<f64>(2).ok()?,
                })
            })
            .collect();

        Ok(rows)
    }

    /// Number of stored passages
    pub async fn count_passages(&self) -> Result<i64> {
        let stmt = Statement::from_string(DbBackend::Postgres, "SELECT COUNT(*) FROM passages");
        let count = self.pool.conn()
            .query_one(stmt)
            .await?
            .and_then(|row| row.try_get_by_index::<i64>(0).ok())
            .unwrap_or(0);
        Ok(count)
    }
}

/// pgvector text format "[1,2,3]"
pub(crate) fn vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding.iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_literal() {
        assert_eq!(vector_literal(&[0.1, 0.2, 0.3]), "[0.1,0.2,0.3]");
        assert_eq!(vector_literal(&[]), "[]");
    }
}
