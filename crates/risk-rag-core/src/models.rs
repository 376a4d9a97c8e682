//! Core data models used throughout Risk RAG.
//!
//! These types describe the evidence that flows from the collaborators
//! through the fusion engine to the downstream consumer.

use serde::Serialize;
use std::fmt;

use crate::sparse::TermVector;
use crate::vector::Vector;

/// The five evidence sources the fusion engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    History,
    Knowledge,
    Vector,
    GraphCsv,
    GraphNeo4j,
}

impl SourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::History => "history",
            SourceTag::Knowledge => "knowledge",
            SourceTag::Vector => "vector",
            SourceTag::GraphCsv => "graph_csv",
            SourceTag::GraphNeo4j => "graph_neo4j",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A piece of candidate evidence owned by whichever source produced it.
#[derive(Debug, Clone, Default)]
pub struct EvidenceItem {
    pub text: Option<String>,
    pub identifier: Option<String>,
    pub metadata: serde_json::Value,
    pub vector: Vector,
    /// Sparse vector kept alongside a dense one for sparse-only queries.
    pub fallback: Option<TermVector>,
}

/// An [`EvidenceItem`] with the score it received for one query.
#[derive(Debug, Clone)]
pub struct ScoredEvidence {
    pub item: EvidenceItem,
    pub score: f64,
}

/// One row of the historical-record collaborator.
///
/// `terms_json` holds raw term counts, `vector_json` either a dense array
/// or a sparse weight object. Either may be malformed.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub identifier: i64,
    pub terms_json: String,
    pub vector_json: String,
}

/// A scored hit from one source, produced fresh per query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredHit {
    pub source: SourceTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "id", skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub score: f64,
}

impl ScoredHit {
    pub fn with_text(source: SourceTag, text: impl Into<String>, score: f64) -> Self {
        Self {
            source,
            text: Some(text.into()),
            identifier: None,
            score,
        }
    }

    pub fn with_id(source: SourceTag, identifier: impl Into<String>, score: f64) -> Self {
        Self {
            source,
            text: None,
            identifier: Some(identifier.into()),
            score,
        }
    }
}

/// Fused, gated result of one retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    /// At most `top_k` hits, descending score.
    pub hits: Vec<ScoredHit>,
    /// Whether enough distinct sources cleared the score threshold.
    pub valid: bool,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self {
            hits: Vec::new(),
            valid: false,
        }
    }
}
