//! # Risk RAG
//!
//! Multi-source evidence retrieval and ranking for financial risk analysis.
//!
//! The scoring and fusion logic lives in [`risk_rag_core`]; this crate
//! supplies the concrete collaborators (SQLite history, HTTP embedding
//! providers, CSV and Neo4j graphs, directory ingestion) and the `rag` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌────────────┐
//! │  History   │  │ Knowledge  │  │  Vector    │  │ Graph CSV  │  │ Graph DB   │
//! │  (SQLite)  │  │ (snippets) │  │  (chunks)  │  │ relations  │  │  (Neo4j)   │
//! └─────┬──────┘  └─────┬──────┘  └─────┬──────┘  └─────┬──────┘  └─────┬──────┘
//!       └───────────────┴───────┬───────┴───────────────┴───────────────┘
//!                               ▼
//!                     ┌───────────────────┐
//!                     │   FusionEngine    │  rank → top_k → sufficiency gate
//!                     └─────────┬─────────┘
//!                               ▼
//!                      { hits, valid } JSON
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`history`] | SQLite history store |
//! | [`embedding`] | Remote, local and disabled embedding providers |
//! | [`ingest`] | Directory scanning, chunking and history embedding |
//! | [`graph_csv`] | `relations.csv` graph |
//! | [`graph_db`] | Neo4j graph over HTTP |
//! | [`retrieve`] | Engine wiring and the `retrieve` command |
//! | [`embed_cmd`] | `embed-dir` and `history` commands |

pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod graph_csv;
pub mod graph_db;
pub mod history;
pub mod ingest;
pub mod migrate;
pub mod retrieve;
