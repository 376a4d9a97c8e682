//! Retrieval wiring: builds every evidence source from configuration and
//! runs one fused query.
//!
//! Source construction mirrors the engine's tolerance: a missing graph
//! directory, an unconfigured graph database or a disabled embedding
//! provider all leave that source quiet instead of failing the command.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use risk_rag_core::error::SourceOutcome;
use risk_rag_core::fusion::{FusionEngine, RetrievalQuery};
use risk_rag_core::models::{RetrievalResult, ScoredHit, SourceTag};
use risk_rag_core::store::ChunkedVectorStore;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::graph_csv::CsvGraph;
use crate::graph_db::Neo4jGraph;
use crate::history::SqliteHistoryStore;
use crate::ingest;

/// What one source did during a retrieval, for `--explain`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceReport {
    pub source: SourceTag,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<SourceOutcome> for SourceReport {
    fn from(outcome: SourceOutcome) -> Self {
        match outcome {
            SourceOutcome::Hits { source, count } => Self {
                source,
                status: "ok",
                count: Some(count),
                reason: None,
            },
            SourceOutcome::Skipped { source } => Self {
                source,
                status: "skipped",
                count: None,
                reason: None,
            },
            SourceOutcome::Failed { source, reason } => Self {
                source,
                status: "failed",
                count: None,
                reason: Some(reason),
            },
        }
    }
}

/// JSON document printed by `rag retrieve`.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalReport {
    pub hits: Vec<ScoredHit>,
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceReport>,
}

/// Build a fusion engine over every configured source.
///
/// `top_k` overrides `retrieval.top_k` when given.
pub async fn build_engine(config: &Config, top_k: Option<usize>) -> Result<FusionEngine> {
    let provider = embedding::create_provider(&config.embedding)?;

    let mut params = config.retrieval.fusion_params()?;
    if let Some(k) = top_k {
        params.top_k = k;
    }
    params.validate()?;

    // History
    let pool = db::connect(config).await?;
    let history = SqliteHistoryStore::new(pool);
    history.init().await?;

    // Vector store over knowledge directories
    let store = ChunkedVectorStore::new(provider.clone(), config.retrieval.store_options());
    let chunking = config.chunking.params();
    for dir in &config.knowledge.dirs {
        let added = ingest::add_directory(&store, dir, &chunking).await?;
        tracing::debug!(dir = %dir.display(), chunks = added, "knowledge directory loaded");
    }

    let mut engine = FusionEngine::new(provider, params)
        .with_history(Arc::new(history))
        .with_knowledge(Arc::new(config.knowledge.snippets.clone()))
        .with_vectors(Arc::new(store));

    if let Some(dir) = &config.graph.csv_dir {
        engine = engine.with_graph_csv(Arc::new(CsvGraph::load(dir)?));
    }

    let timeout = Duration::from_secs(config.embedding.timeout_secs);
    engine = engine.with_graph_db(Arc::new(Neo4jGraph::new(&config.graph, timeout)?));

    Ok(engine)
}

/// Run one retrieval and collect the report.
pub async fn retrieve(
    config: &Config,
    query: &str,
    subject: Option<&str>,
    top_k: Option<usize>,
    explain: bool,
) -> Result<RetrievalReport> {
    let engine = build_engine(config, top_k).await?;

    let mut request = RetrievalQuery::new(query);
    if let Some(subject) = subject {
        request = request.with_subject(subject);
    }

    let (result, outcomes): (RetrievalResult, Vec<SourceOutcome>) =
        engine.retrieve_explained(&request).await?;

    tracing::info!(
        hits = result.hits.len(),
        valid = result.valid,
        "retrieval finished"
    );

    Ok(RetrievalReport {
        hits: result.hits,
        valid: result.valid,
        sources: if explain {
            outcomes.into_iter().map(SourceReport::from).collect()
        } else {
            Vec::new()
        },
    })
}

pub async fn run_retrieve(
    config: &Config,
    query: &str,
    subject: Option<&str>,
    top_k: Option<usize>,
    explain: bool,
) -> Result<()> {
    let report = retrieve(config, query, subject, top_k, explain).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_report_from_outcome() {
        let report = SourceReport::from(SourceOutcome::Failed {
            source: SourceTag::History,
            reason: "locked".to_string(),
        });
        assert_eq!(report.status, "failed");
        assert_eq!(report.reason.as_deref(), Some("locked"));

        let json = serde_json::to_value(SourceReport::from(SourceOutcome::Skipped {
            source: SourceTag::GraphNeo4j,
        }))
        .unwrap();
        assert_eq!(json, serde_json::json!({"source": "graph_neo4j", "status": "skipped"}));
    }
}
