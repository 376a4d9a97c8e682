//! Directory ingestion.
//!
//! Two flows share one file scanner:
//! - [`add_directory`] chunks `.txt`/`.md` files into overlapping word
//!   windows and appends them to a [`ChunkedVectorStore`].
//! - [`embed_directory`] embeds whole files and writes them into the
//!   history database under sequential assessment ids.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use risk_rag_core::chunk::{chunk_words, ChunkingParams};
use risk_rag_core::embedding::{embed_all, EmbedRole, EmbeddingProvider};
use risk_rag_core::models::HistoryRecord;
use risk_rag_core::sparse::build_terms;
use risk_rag_core::store::ChunkedVectorStore;
use risk_rag_core::vector::{vector_to_json, Vector};

use crate::config::Config;
use crate::embedding;
use crate::history::SqliteHistoryStore;

/// Files the vector store ingests.
pub const CHUNK_GLOBS: &[&str] = &["**/*.txt", "**/*.md"];

/// Files written into the history database.
pub const HISTORY_GLOBS: &[&str] = &["**/*.txt", "**/*.md", "**/*.html"];

/// Summary of one [`embed_directory`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedReport {
    pub files: usize,
    pub dense: usize,
    pub total_rows: i64,
}

/// All matching files under `root`, sorted for deterministic ordering.
///
/// A missing directory yields an empty list. Unreadable entries are logged
/// and skipped.
pub fn scan_files(root: &Path, include: &[&str]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        tracing::debug!(path = %root.display(), "ingest directory does not exist");
        return Ok(Vec::new());
    }

    let include_set = build_globset(include)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_lowercase();

        if include_set.is_match(&rel_str) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Chunk every `.txt`/`.md` file under `root` into `store`.
///
/// Each chunk carries metadata `{source, chunk}`. A non-empty file that
/// yields no windows is added whole. Returns the number of chunks added.
pub async fn add_directory(
    store: &ChunkedVectorStore,
    root: &Path,
    chunking: &ChunkingParams,
) -> Result<usize> {
    let mut total = 0;

    for path in scan_files(root, CHUNK_GLOBS)? {
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        let mut chunks = chunk_words(&text, chunking);
        if chunks.is_empty() && !text.is_empty() {
            chunks.push(text);
        }

        let source = path.display().to_string();
        let docs: Vec<(String, serde_json::Value)> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| (chunk, serde_json::json!({ "source": source, "chunk": i })))
            .collect();

        let added = store.add_documents(docs).await;
        tracing::debug!(path = %path.display(), chunks = added, "ingested file");
        total += added;
    }

    Ok(total)
}

/// Embed every `.txt`/`.md`/`.html` file under `root` into the history
/// database, assigning ids `offset, offset + 1, ...` in path order.
///
/// Files are embedded in one batch where possible, falling back to one call
/// per file. Files without a dense vector are stored with a `null` vector
/// and are later scored on their raw terms.
pub async fn embed_directory(
    provider: &dyn EmbeddingProvider,
    history: &SqliteHistoryStore,
    root: &Path,
    offset: i64,
) -> Result<EmbedReport> {
    let files = scan_files(root, HISTORY_GLOBS)?;
    if files.is_empty() {
        return Ok(EmbedReport {
            files: 0,
            dense: 0,
            total_rows: history.count().await?,
        });
    }

    // Lossy read; a binary-ish file still contributes whatever text it has
    let texts: Vec<String> = files
        .iter()
        .map(|p| {
            std::fs::read(p)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default()
        })
        .collect();

    let vectors = embed_all(provider, &texts, EmbedRole::Document).await;
    let dense = vectors.iter().filter(|v| v.is_some()).count();

    let records: Vec<HistoryRecord> = texts
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (text, vector))| {
            let terms = build_terms(Some(text));
            HistoryRecord {
                identifier: offset + i as i64,
                terms_json: serde_json::to_string(&terms).unwrap_or_else(|_| "{}".to_string()),
                vector_json: vector_to_json(&vector.map(Vector::Dense).unwrap_or_default()),
            }
        })
        .collect();

    history.save_batch(&records).await?;

    Ok(EmbedReport {
        files: files.len(),
        dense,
        total_rows: history.count().await?,
    })
}

/// `rag ingest <dir>`: chunk a directory into a fresh in-memory store and
/// report what was added. Nothing is persisted.
pub async fn run_ingest(config: &Config, dir: &Path) -> Result<()> {
    let provider = embedding::create_provider(&config.embedding)?;
    let store = ChunkedVectorStore::new(provider.clone(), config.retrieval.store_options());
    let added = add_directory(&store, dir, &config.chunking.params()).await?;

    println!("ingest {}", dir.display());
    println!("  provider: {}", provider.model_name());
    println!("  chunks: {}", added);
    println!("  indexed: {}", store.indexed_len());
    Ok(())
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
