//! Embedding provider trait and batch helpers.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement. The contract is deliberately infallible at the boundary:
//! every network, model, or decoding failure is reported as `None` and
//! callers fall back to sparse scoring.
//!
//! Concrete provider implementations (remote HTTP, local fastembed,
//! disabled) live in the `risk-rag` app crate.

use async_trait::async_trait;
use std::borrow::Cow;

use crate::vector::DenseVector;

/// Whether text is being encoded as a search query or as a stored document.
///
/// Asymmetric models (e5, bge) expect different prefixes for the two roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedRole {
    Query,
    Document,
}

/// Role-dependent text prefixing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixPolicy {
    pub enabled: bool,
    pub query_prefix: String,
    pub document_prefix: String,
}

impl PrefixPolicy {
    /// A policy that never touches the input.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            query_prefix: String::new(),
            document_prefix: String::new(),
        }
    }

    /// Prefix `text` for `role`, or borrow it unchanged when disabled.
    pub fn apply<'a>(&self, text: &'a str, role: EmbedRole) -> Cow<'a, str> {
        if !self.enabled {
            return Cow::Borrowed(text);
        }
        let prefix = match role {
            EmbedRole::Query => &self.query_prefix,
            EmbedRole::Document => &self.document_prefix,
        };
        if prefix.is_empty() {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(format!("{prefix}{text}"))
        }
    }
}

impl Default for PrefixPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            query_prefix: "query: ".to_string(),
            document_prefix: "passage: ".to_string(),
        }
    }
}

/// Trait for embedding providers.
///
/// Implementations own their retry and timeout policy. Neither method may
/// panic or surface an error: failures degrade to `None`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed one text. `None` for empty input or on any failure.
    async fn embed_one(&self, text: &str, role: EmbedRole) -> Option<DenseVector>;

    /// Embed a batch in one call.
    ///
    /// `None` means the batch call failed outright. Otherwise the result has
    /// exactly one slot per input, in input order; slots may be `None`
    /// individually.
    async fn embed_batch(&self, texts: &[String], role: EmbedRole) -> Option<Vec<Option<DenseVector>>>;
}

/// A provider that never produces a dense vector.
///
/// Used when no backend is configured or available; everything downstream
/// runs on sparse vectors.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEmbeddings;

#[async_trait]
impl EmbeddingProvider for NoEmbeddings {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed_one(&self, _text: &str, _role: EmbedRole) -> Option<DenseVector> {
        None
    }

    async fn embed_batch(&self, _texts: &[String], _role: EmbedRole) -> Option<Vec<Option<DenseVector>>> {
        None
    }
}

/// Embed every text, preferring one batched call.
///
/// If the batch fails outright (or returns the wrong number of slots) each
/// text is embedded individually. Slots the batch left empty get one
/// individual retry. The result always has one slot per input.
pub async fn embed_all(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    role: EmbedRole,
) -> Vec<Option<DenseVector>> {
    if texts.is_empty() {
        return Vec::new();
    }

    let batch = match provider.embed_batch(texts, role).await {
        Some(slots) if slots.len() == texts.len() => Some(slots),
        Some(slots) => {
            tracing::warn!(
                expected = texts.len(),
                got = slots.len(),
                "batch embedding returned wrong slot count, embedding individually"
            );
            None
        }
        None => {
            tracing::info!(
                count = texts.len(),
                provider = provider.model_name(),
                "batch embedding failed, embedding individually"
            );
            None
        }
    };

    let mut slots = batch.unwrap_or_else(|| vec![None; texts.len()]);
    for (slot, text) in slots.iter_mut().zip(texts) {
        if slot.is_none() {
            *slot = provider.embed_one(text, role).await;
        }
    }
    slots
}
