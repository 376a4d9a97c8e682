//! Error types for the retrieval core.

use crate::models::SourceTag;

/// Failure of one evidence source.
///
/// The fusion engine never propagates these; they are logged and the
/// source contributes no hits.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("source query failed: {reason}")]
    QueryFailed { reason: String },
}

impl SourceError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn query_failed(reason: impl Into<String>) -> Self {
        Self::QueryFailed {
            reason: reason.into(),
        }
    }
}

/// Errors surfaced to callers of the fusion engine.
///
/// Only parameter problems are surfaced; source failures are absorbed.
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error("invalid retrieval config: {reason}")]
    InvalidConfig { reason: String },
}

/// Per-source outcome, recorded for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Hits { source: SourceTag, count: usize },
    Skipped { source: SourceTag },
    Failed { source: SourceTag, reason: String },
}
