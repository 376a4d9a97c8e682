//! `rag embed-dir` and `rag history` commands.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use risk_rag_core::fusion::similar_history;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::history::SqliteHistoryStore;
use crate::ingest;

async fn open_history(config: &Config) -> Result<SqliteHistoryStore> {
    let pool = db::connect(config).await?;
    let history = SqliteHistoryStore::new(pool);
    history.init().await?;
    Ok(history)
}

/// Embed every document under `dir` into the history database.
pub async fn run_embed_dir(config: &Config, dir: &Path, offset: i64) -> Result<()> {
    let provider = embedding::create_provider(&config.embedding)?;
    let history = open_history(config).await?;

    let report = ingest::embed_directory(provider.as_ref(), &history, dir, offset).await?;

    if report.files == 0 {
        println!("embed-dir");
        println!("  no .txt/.md/.html files found in {}", dir.display());
        return Ok(());
    }

    println!("embed-dir");
    println!("  provider: {}", provider.model_name());
    println!("  files: {}", report.files);
    println!("  dense: {}", report.dense);
    println!("  sparse-only: {}", report.files - report.dense);
    println!("  ids: {}..={}", offset, offset + report.files as i64 - 1);
    println!("  total rows: {}", report.total_rows);

    history.pool().close().await;
    Ok(())
}

pub async fn run_history_count(config: &Config) -> Result<()> {
    let history = open_history(config).await?;
    println!("{}", history.count().await?);
    history.pool().close().await;
    Ok(())
}

pub async fn run_history_clear(config: &Config) -> Result<()> {
    let history = open_history(config).await?;
    let removed = history.clear().await?;
    println!("history cleared");
    println!("  rows removed: {}", removed);
    history.pool().close().await;
    Ok(())
}

/// One row printed by `rag history similar`.
#[derive(Debug, Serialize)]
struct SimilarRow {
    id: i64,
    score: f64,
}

/// Print the stored assessments most similar to `text` as JSON.
///
/// `top_k` overrides `retrieval.top_k` when given.
pub async fn run_history_similar(config: &Config, text: &str, top_k: Option<usize>) -> Result<()> {
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let provider = embedding::create_provider(&config.embedding)?;
    let history = open_history(config).await?;

    let rows: Vec<SimilarRow> = similar_history(provider.as_ref(), &history, text, top_k)
        .await?
        .into_iter()
        .map(|(id, score)| SimilarRow { id, score })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rows)?);
    history.pool().close().await;
    Ok(())
}
