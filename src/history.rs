//! SQLite-backed history of past assessments.
//!
//! Each row stores an assessment id, its raw term counts as JSON, and its
//! vector as JSON (a dense array or a sparse map). The fusion engine reads
//! every row through the [`HistoryStore`] trait.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use risk_rag_core::error::SourceError;
use risk_rag_core::models::HistoryRecord;
use risk_rag_core::sources::HistoryStore;

use crate::migrate;

#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the schema if missing.
    pub async fn init(&self) -> Result<()> {
        migrate::migrate(&self.pool).await
    }

    /// Insert records in one transaction. Returns rows written.
    pub async fn save_batch(&self, records: &[HistoryRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query("INSERT INTO embeddings (assessment_id, terms, vector) VALUES (?, ?, ?)")
                .bind(record.identifier)
                .bind(&record.terms_json)
                .bind(&record.vector_json)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    pub async fn load_all(&self) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(
            "SELECT assessment_id, COALESCE(terms, '') AS terms, COALESCE(vector, '') AS vector \
             FROM embeddings ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| HistoryRecord {
                identifier: row.get("assessment_id"),
                terms_json: row.get("terms"),
                vector_json: row.get("vector"),
            })
            .collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Delete every row. Returns rows removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM embeddings").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn all_records(&self) -> Result<Vec<HistoryRecord>, SourceError> {
        self.load_all()
            .await
            .map_err(|e| SourceError::query_failed(format!("history: {:#}", e)))
    }
}
