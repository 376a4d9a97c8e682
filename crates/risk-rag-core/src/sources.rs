//! Collaborator interfaces consumed by the fusion engine.
//!
//! Every source is async (via `async-trait`) so native adapters can hit
//! SQLite or HTTP, while in-memory implementations return immediately.
//! Each method returns a [`SourceError`] on failure; the engine turns that
//! into an empty contribution.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::models::{HistoryRecord, ScoredEvidence};

/// Previously stored `(identifier, terms, vector)` triples.
///
/// No filtering or pagination: the engine scores and ranks everything.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn all_records(&self) -> Result<Vec<HistoryRecord>, SourceError>;
}

/// Curated knowledge snippets, already materialized.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn snippets(&self) -> Result<Vec<String>, SourceError>;
}

/// A searchable collection of chunked evidence.
#[async_trait]
pub trait VectorSource: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredEvidence>, SourceError>;
}

/// Natural-language relationship descriptions about a subject.
#[async_trait]
pub trait GraphSource: Send + Sync {
    async fn describe_subject(&self, subject: &str, limit: usize) -> Result<Vec<String>, SourceError>;
}

/// A live graph database; skipped entirely when unavailable.
pub trait GraphDatabase: GraphSource {
    fn is_available(&self) -> bool;
}

#[async_trait]
impl HistoryStore for Vec<HistoryRecord> {
    async fn all_records(&self) -> Result<Vec<HistoryRecord>, SourceError> {
        Ok(self.clone())
    }
}

#[async_trait]
impl KnowledgeSource for Vec<String> {
    async fn snippets(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.clone())
    }
}
