use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::ann::InnerProductIndex;
use crate::embedding::{embed_all, EmbedRole, EmbeddingProvider};
use crate::error::SourceError;
use crate::models::{EvidenceItem, ScoredEvidence};
use crate::sources::VectorSource;
use crate::sparse::terms_for;
use crate::vector::{score_with_fallback, DenseVector, Vector};

use super::StoreOptions;

#[derive(Default)]
struct Inner {
    items: Vec<EvidenceItem>,
    index: Option<InnerProductIndex>,
}

impl Inner {
    /// Append an item, indexing its dense vector when the dimensionality fits.
    fn push(&mut self, item: EvidenceItem, ann_enabled: bool) -> usize {
        let position = self.items.len();
        if ann_enabled {
            if let Vector::Dense(v) = &item.vector {
                let index = self
                    .index
                    .get_or_insert_with(|| InnerProductIndex::new(v.len()));
                if !index.insert(position, v) {
                    tracing::debug!(
                        position,
                        dims = v.len(),
                        index_dims = index.dims(),
                        "dense vector dimensionality differs from index, kept out of index"
                    );
                }
            }
        }
        self.items.push(item);
        position
    }
}

/// In-memory chunk collection with an optional nearest-neighbour index.
pub struct ChunkedVectorStore {
    provider: Arc<dyn EmbeddingProvider>,
    options: StoreOptions,
    inner: RwLock<Inner>,
}

impl ChunkedVectorStore {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, options: StoreOptions) -> Self {
        Self {
            provider,
            options,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Embed and append one document. Returns its position in the store.
    ///
    /// Falls back to the normalized sparse vector when the provider yields
    /// nothing.
    pub async fn add_document(&self, text: &str, metadata: serde_json::Value) -> usize {
        let dense = self.provider.embed_one(text, EmbedRole::Document).await;
        let item = make_item(text, metadata, dense);
        self.write().push(item, self.options.ann_enabled)
    }

    /// Embed and append many documents with one batched provider call.
    ///
    /// Returns the number of items added.
    pub async fn add_documents(&self, docs: Vec<(String, serde_json::Value)>) -> usize {
        if docs.is_empty() {
            return 0;
        }
        let texts: Vec<String> = docs.iter().map(|(t, _)| t.clone()).collect();
        let vectors = embed_all(self.provider.as_ref(), &texts, EmbedRole::Document).await;

        let mut inner = self.write();
        let count = docs.len();
        for ((text, metadata), dense) in docs.into_iter().zip(vectors) {
            inner.push(make_item(&text, metadata, dense), self.options.ann_enabled);
        }
        count
    }

    /// Up to `top_k` items most similar to `query`, descending score.
    ///
    /// Uses the index when it exists and matches the dense query's
    /// dimensionality; otherwise scores every item and keeps insertion
    /// order among equal scores.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<ScoredEvidence> {
        if top_k == 0 || self.is_empty() {
            return Vec::new();
        }

        let query_vector = match self.provider.embed_one(query, EmbedRole::Query).await {
            Some(v) => Vector::Dense(v),
            None => Vector::Sparse(terms_for(query)),
        };

        let inner = self.read();

        if self.options.ann_enabled {
            if let (Some(index), Vector::Dense(q)) = (&inner.index, &query_vector) {
                if index.dims() == q.len() {
                    return index
                        .search(q, top_k)
                        .into_iter()
                        .filter_map(|n| {
                            inner.items.get(n.position).map(|item| ScoredEvidence {
                                item: item.clone(),
                                score: n.score,
                            })
                        })
                        .collect();
                }
            }
        }

        let mut scored: Vec<(usize, f64)> = inner
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                (
                    i,
                    score_with_fallback(&query_vector, &item.vector, item.fallback.as_ref()),
                )
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(i, score)| ScoredEvidence {
                item: inner.items[i].clone(),
                score,
            })
            .collect()
    }

    /// Drop and rebuild the index from the canonical list.
    pub fn rebuild_index(&self) {
        let mut inner = self.write();
        let items = std::mem::take(&mut inner.items);
        inner.index = None;
        for item in items {
            inner.push(item, self.options.ann_enabled);
        }
    }

    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().items.is_empty()
    }

    /// Number of items present in the index.
    pub fn indexed_len(&self) -> usize {
        self.read().index.as_ref().map_or(0, InnerProductIndex::len)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn make_item(text: &str, metadata: serde_json::Value, dense: Option<DenseVector>) -> EvidenceItem {
    let sparse = terms_for(text);
    let (vector, fallback) = match dense {
        Some(v) => (Vector::Dense(v), Some(sparse)),
        None => (Vector::Sparse(sparse), None),
    };
    EvidenceItem {
        text: Some(text.to_string()),
        identifier: Some(Uuid::new_v4().to_string()),
        metadata,
        vector,
        fallback,
    }
}

#[async_trait]
impl VectorSource for ChunkedVectorStore {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredEvidence>, SourceError> {
        Ok(ChunkedVectorStore::search(self, query, top_k).await)
    }
}
