use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the history schema on an open pool. Idempotent.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // One row per assessment: raw term counts and the stored vector, both JSON
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            assessment_id INTEGER NOT NULL,
            terms TEXT NOT NULL DEFAULT '{}',
            vector TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_embeddings_assessment_id ON embeddings(assessment_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
