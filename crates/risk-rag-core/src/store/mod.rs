//! In-memory evidence storage.
//!
//! [`ChunkedVectorStore`] is the single owner of the chunk collection. It
//! keeps two views of the same data:
//!
//! - the canonical append-only list of [`EvidenceItem`](crate::models::EvidenceItem)s,
//!   which is the source of truth, and
//! - an optional [`InnerProductIndex`](crate::ann::InnerProductIndex) over
//!   the dense vectors that share the first-seen dimensionality, which is a
//!   derived cache and can be rebuilt from the list at any time.
//!
//! Both live behind one `RwLock`, so searches proceed concurrently and
//! writers only block while appending (embeddings are computed before the
//! lock is taken).

mod chunked;

pub use chunked::ChunkedVectorStore;

/// Construction options for [`ChunkedVectorStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Maintain the nearest-neighbour index for dense vectors.
    pub ann_enabled: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { ann_enabled: true }
    }
}
