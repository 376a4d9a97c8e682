//! # Risk RAG Core
//!
//! Shared retrieval logic for Risk RAG: sparse and dense vectors,
//! similarity scoring, chunking, the in-memory chunk store, collaborator
//! traits, and the multi-source fusion engine.
//!
//! This crate contains no tokio runtime, sqlx, HTTP clients, or
//! filesystem I/O. Concrete embedding providers and collaborator adapters
//! live in the `risk-rag` app crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`sparse`] | Term-frequency vectors |
//! | [`vector`] | Dense/sparse representations, cosine scoring, reconciliation |
//! | [`embedding`] | Embedding provider trait, prefixing, batch fallback |
//! | [`chunk`] | Overlapping word-window chunker |
//! | [`ann`] | Inner-product nearest-neighbour index |
//! | [`store`] | Chunked vector store |
//! | [`sources`] | Collaborator interfaces |
//! | [`fusion`] | Score fusion and sufficiency gate |

pub mod ann;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod models;
pub mod sources;
pub mod sparse;
pub mod store;
pub mod vector;
