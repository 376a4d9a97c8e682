//! Multi-source retrieval fusion with a sufficiency gate.
//!
//! The engine queries every configured evidence source in turn, scores
//! the candidates, merges everything into one ranking and decides whether
//! the evidence is strong and diverse enough to answer from.
//!
//! # Algorithm
//!
//! 1. Build query vectors: a dense embedding (if the provider yields one)
//!    and the normalized sparse term vector (always).
//! 2. **history**: score every stored record, keep the best `top_k`.
//! 3. **knowledge**: sparse-score every curated snippet.
//! 4. **vector**: take the chunk store's `top_k` with its scores.
//! 5. **graph_csv** / **graph_neo4j**: relationship descriptions at fixed
//!    configurable scores; the database source is skipped when unavailable.
//! 6. Concatenate, stable-sort by descending score, truncate to `top_k`.
//! 7. Gate: among *all* hits with `score >= min_score`, count distinct
//!    sources; the result is valid iff that count is `>= min_sources`.
//!
//! Sources are awaited one after another. A failing source is logged and
//! contributes nothing; the engine never retries.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::embedding::{EmbedRole, EmbeddingProvider};
use crate::error::{FusionError, SourceError, SourceOutcome};
use crate::models::{HistoryRecord, RetrievalResult, ScoredHit, SourceTag};
use crate::sources::{GraphDatabase, GraphSource, HistoryStore, KnowledgeSource, VectorSource};
use crate::sparse::{terms_for, TermVector};
use crate::vector::{cosine_dense, cosine_sparse, parse_terms_json, parse_vector_json, DenseVector, Vector};

/// How knowledge snippets are scored when the query has a dense vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KnowledgeScoring {
    /// Knowledge scores are forced to `0.0` whenever a dense query vector
    /// exists; sparse scoring only runs without one.
    #[default]
    ZeroWhenDense,
    /// Always score knowledge snippets with sparse cosine.
    AlwaysSparse,
}

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionParams {
    /// Maximum hits returned, and per-source candidate limit.
    pub top_k: usize,
    /// Minimum score for a hit to count toward the gate.
    pub min_score: f64,
    /// Minimum number of distinct sources above `min_score`.
    pub min_sources: usize,
    /// Constant score for tabular graph descriptions.
    pub graph_csv_score: f64,
    /// Constant score for graph database descriptions.
    pub graph_db_score: f64,
    pub knowledge_scoring: KnowledgeScoring,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: 0.25,
            min_sources: 2,
            graph_csv_score: 0.3,
            graph_db_score: 0.4,
            knowledge_scoring: KnowledgeScoring::ZeroWhenDense,
        }
    }
}

impl FusionParams {
    pub fn validate(&self) -> Result<(), FusionError> {
        let invalid = |reason: &str| {
            Err(FusionError::InvalidConfig {
                reason: reason.to_string(),
            })
        };
        if self.top_k == 0 {
            return invalid("top_k must be >= 1");
        }
        if self.min_sources == 0 {
            return invalid("min_sources must be >= 1");
        }
        if !self.min_score.is_finite() {
            return invalid("min_score must be finite");
        }
        if !self.graph_csv_score.is_finite() || !self.graph_db_score.is_finite() {
            return invalid("graph scores must be finite");
        }
        Ok(())
    }
}

/// Inputs for a single retrieval.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalQuery<'a> {
    /// Free-text query.
    pub text: &'a str,
    /// Subject for the graph sources; defaults to `text`.
    pub subject: Option<&'a str>,
}

impl<'a> RetrievalQuery<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, subject: None }
    }

    pub fn with_subject(mut self, subject: &'a str) -> Self {
        self.subject = Some(subject);
        self
    }

    fn subject(&self) -> &'a str {
        self.subject.unwrap_or(self.text)
    }
}

/// Query representations built once per retrieval.
#[derive(Debug, Clone)]
pub struct QueryVectors {
    pub dense: Option<DenseVector>,
    pub sparse: TermVector,
}

/// Orchestrates the evidence sources and gates the fused result.
pub struct FusionEngine {
    provider: Arc<dyn EmbeddingProvider>,
    params: FusionParams,
    history: Option<Arc<dyn HistoryStore>>,
    knowledge: Option<Arc<dyn KnowledgeSource>>,
    vectors: Option<Arc<dyn VectorSource>>,
    graph_csv: Option<Arc<dyn GraphSource>>,
    graph_db: Option<Arc<dyn GraphDatabase>>,
}

impl FusionEngine {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, params: FusionParams) -> Self {
        Self {
            provider,
            params,
            history: None,
            knowledge: None,
            vectors: None,
            graph_csv: None,
            graph_db: None,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeSource>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_vectors(mut self, vectors: Arc<dyn VectorSource>) -> Self {
        self.vectors = Some(vectors);
        self
    }

    pub fn with_graph_csv(mut self, graph: Arc<dyn GraphSource>) -> Self {
        self.graph_csv = Some(graph);
        self
    }

    pub fn with_graph_db(mut self, graph: Arc<dyn GraphDatabase>) -> Self {
        self.graph_db = Some(graph);
        self
    }

    /// Run one retrieval across all sources.
    pub async fn retrieve(&self, query: &RetrievalQuery<'_>) -> Result<RetrievalResult, FusionError> {
        self.retrieve_explained(query).await.map(|(result, _)| result)
    }

    /// Like [`retrieve`](Self::retrieve), also reporting what each source did.
    pub async fn retrieve_explained(
        &self,
        query: &RetrievalQuery<'_>,
    ) -> Result<(RetrievalResult, Vec<SourceOutcome>), FusionError> {
        self.params.validate()?;

        let qv = self.query_vectors(query.text).await;
        let top_k = self.params.top_k;
        let mut hits: Vec<ScoredHit> = Vec::new();
        let mut outcomes = Vec::with_capacity(5);

        let history = match &self.history {
            Some(h) => Some(
                h.all_records()
                    .await
                    .map(|records| score_history(&records, &qv, top_k)),
            ),
            None => None,
        };
        record_outcome(SourceTag::History, history, &mut hits, &mut outcomes);

        let knowledge = match &self.knowledge {
            Some(k) => Some(
                k.snippets()
                    .await
                    .map(|snippets| score_knowledge(&snippets, &qv, self.params.knowledge_scoring)),
            ),
            None => None,
        };
        record_outcome(SourceTag::Knowledge, knowledge, &mut hits, &mut outcomes);

        let vector = match &self.vectors {
            Some(v) => Some(v.search(query.text, top_k).await.map(|found| {
                found
                    .into_iter()
                    .map(|e| ScoredHit {
                        source: SourceTag::Vector,
                        text: e.item.text,
                        identifier: e.item.identifier,
                        score: e.score,
                    })
                    .collect()
            })),
            None => None,
        };
        record_outcome(SourceTag::Vector, vector, &mut hits, &mut outcomes);

        let graph_csv = match &self.graph_csv {
            Some(g) => Some(
                describe(g.as_ref(), query.subject(), top_k, SourceTag::GraphCsv, self.params.graph_csv_score)
                    .await,
            ),
            None => None,
        };
        record_outcome(SourceTag::GraphCsv, graph_csv, &mut hits, &mut outcomes);

        let graph_db = match &self.graph_db {
            Some(g) if g.is_available() => Some(
                describe(g.as_ref(), query.subject(), top_k, SourceTag::GraphNeo4j, self.params.graph_db_score)
                    .await,
            ),
            Some(_) => {
                tracing::debug!("graph database unavailable, skipping");
                None
            }
            None => None,
        };
        record_outcome(SourceTag::GraphNeo4j, graph_db, &mut hits, &mut outcomes);

        Ok((fuse(hits, &self.params), outcomes))
    }

    async fn query_vectors(&self, text: &str) -> QueryVectors {
        QueryVectors {
            dense: self.provider.embed_one(text, EmbedRole::Query).await,
            sparse: terms_for(text),
        }
    }
}

fn record_outcome(
    source: SourceTag,
    result: Option<Result<Vec<ScoredHit>, SourceError>>,
    hits: &mut Vec<ScoredHit>,
    outcomes: &mut Vec<SourceOutcome>,
) {
    match result {
        None => outcomes.push(SourceOutcome::Skipped { source }),
        Some(Ok(found)) => {
            tracing::debug!(source = %source, count = found.len(), "evidence source scored");
            outcomes.push(SourceOutcome::Hits {
                source,
                count: found.len(),
            });
            hits.extend(found);
        }
        Some(Err(e)) => {
            tracing::warn!(source = %source, error = %e, "evidence source failed, continuing without it");
            outcomes.push(SourceOutcome::Failed {
                source,
                reason: e.to_string(),
            });
        }
    }
}

async fn describe<G: GraphSource + ?Sized>(
    graph: &G,
    subject: &str,
    limit: usize,
    source: SourceTag,
    score: f64,
) -> Result<Vec<ScoredHit>, SourceError> {
    let lines = graph.describe_subject(subject, limit).await?;
    Ok(lines
        .into_iter()
        .take(limit)
        .map(|line| ScoredHit::with_text(source, line, score))
        .collect())
}

/// Score one stored record against the query.
///
/// Dense cosine when both sides are dense; otherwise sparse cosine against
/// the stored sparse vector, then against the stored raw terms; else 0.0.
pub fn score_history_record(record: &HistoryRecord, qv: &QueryVectors) -> f64 {
    let vector = parse_vector_json(&record.vector_json);
    match (&qv.dense, &vector) {
        (Some(q), Vector::Dense(v)) => cosine_dense(q, v),
        (_, Vector::Sparse(v)) => cosine_sparse(&qv.sparse, v),
        _ => match parse_terms_json(&record.terms_json) {
            Some(terms) => cosine_sparse(&qv.sparse, &terms),
            None => 0.0,
        },
    }
}

/// Stored records most similar to `text`, best first, as `(id, score)`.
///
/// Scores each record with [`score_history_record`]; the history store's
/// error is returned rather than absorbed.
pub async fn similar_history(
    provider: &dyn EmbeddingProvider,
    history: &dyn HistoryStore,
    text: &str,
    top_k: usize,
) -> Result<Vec<(i64, f64)>, SourceError> {
    let records = history.all_records().await?;
    let qv = QueryVectors {
        dense: provider.embed_one(text, EmbedRole::Query).await,
        sparse: terms_for(text),
    };
    Ok(rank_history(&records, &qv, top_k))
}

fn rank_history(records: &[HistoryRecord], qv: &QueryVectors, top_k: usize) -> Vec<(i64, f64)> {
    let mut scored: Vec<(i64, f64)> = records
        .iter()
        .map(|r| (r.identifier, score_history_record(r, qv)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored
}

fn score_history(records: &[HistoryRecord], qv: &QueryVectors, top_k: usize) -> Vec<ScoredHit> {
    rank_history(records, qv, top_k)
        .into_iter()
        .map(|(id, score)| ScoredHit::with_id(SourceTag::History, id.to_string(), score))
        .collect()
}

fn score_knowledge(snippets: &[String], qv: &QueryVectors, policy: KnowledgeScoring) -> Vec<ScoredHit> {
    let zeroed = policy == KnowledgeScoring::ZeroWhenDense && qv.dense.is_some();
    if zeroed {
        tracing::debug!(count = snippets.len(), "dense query vector present, knowledge scores set to 0.0");
    }
    snippets
        .iter()
        .map(|s| {
            let score = if zeroed {
                0.0
            } else {
                cosine_sparse(&qv.sparse, &terms_for(s))
            };
            ScoredHit::with_text(SourceTag::Knowledge, s.clone(), score)
        })
        .collect()
}

/// Merge hits from all sources into a gated result.
///
/// Stable sort by descending score, truncate to `top_k`; `valid` counts
/// distinct sources over every hit (not only the kept ones) whose score
/// reaches `min_score`. A non-finite score is reset to 0.0 first.
pub fn fuse(mut hits: Vec<ScoredHit>, params: &FusionParams) -> RetrievalResult {
    for hit in hits.iter_mut().filter(|h| !h.score.is_finite()) {
        tracing::debug!(source = %hit.source, "non-finite score reset to 0.0");
        hit.score = 0.0;
    }
    sort_desc(&mut hits);

    let passing: BTreeSet<SourceTag> = hits
        .iter()
        .filter(|h| h.score >= params.min_score)
        .map(|h| h.source)
        .collect();
    let valid = passing.len() >= params.min_sources;

    hits.truncate(params.top_k);
    RetrievalResult { hits, valid }
}

fn sort_desc(hits: &mut [ScoredHit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::NoEmbeddings;
    use async_trait::async_trait;

    struct FixedGraph(Vec<&'static str>);

    #[async_trait]
    impl GraphSource for FixedGraph {
        async fn describe_subject(&self, _subject: &str, limit: usize) -> Result<Vec<String>, SourceError> {
            Ok(self.0.iter().take(limit).map(|s| s.to_string()).collect())
        }
    }

    fn hit(source: SourceTag, score: f64) -> ScoredHit {
        ScoredHit::with_text(source, "x", score)
    }

    fn sparse_qv(text: &str) -> QueryVectors {
        QueryVectors {
            dense: None,
            sparse: terms_for(text),
        }
    }

    #[test]
    fn test_fuse_two_sources_valid() {
        let params = FusionParams::default();
        let result = fuse(
            vec![hit(SourceTag::History, 0.30), hit(SourceTag::GraphNeo4j, 0.40)],
            &params,
        );
        assert!(result.valid);
        let order: Vec<_> = result.hits.iter().map(|h| (h.source, h.score)).collect();
        assert_eq!(order, vec![(SourceTag::GraphNeo4j, 0.40), (SourceTag::History, 0.30)]);
    }

    #[test]
    fn test_fuse_single_source_invalid() {
        let params = FusionParams::default();
        let hits = (0..10).map(|_| hit(SourceTag::Vector, 0.99)).collect();
        let result = fuse(hits, &params);
        assert!(!result.valid);
        assert_eq!(result.hits.len(), 3);
    }

    #[test]
    fn test_gate_counts_hits_beyond_top_k() {
        let params = FusionParams {
            top_k: 1,
            ..FusionParams::default()
        };
        let result = fuse(
            vec![hit(SourceTag::Knowledge, 0.9), hit(SourceTag::GraphCsv, 0.3)],
            &params,
        );
        assert_eq!(result.hits.len(), 1);
        assert!(result.valid);
    }

    #[test]
    fn test_fuse_stable_on_ties() {
        let params = FusionParams::default();
        let result = fuse(
            vec![
                ScoredHit::with_text(SourceTag::GraphCsv, "first", 0.3),
                ScoredHit::with_text(SourceTag::GraphCsv, "second", 0.3),
            ],
            &params,
        );
        assert_eq!(result.hits[0].text.as_deref(), Some("first"));
        assert_eq!(result.hits[1].text.as_deref(), Some("second"));
    }

    #[test]
    fn test_fuse_orders_and_defines_non_finite_scores() {
        let params = FusionParams::default();
        let result = fuse(
            vec![
                hit(SourceTag::History, 0.30),
                hit(SourceTag::History, f64::NAN),
                hit(SourceTag::GraphNeo4j, 0.40),
            ],
            &params,
        );
        let scores: Vec<f64> = result.hits.iter().map(|h| h.score).collect();
        assert_eq!(scores, vec![0.40, 0.30, 0.0]);
    }

    #[test]
    fn test_history_overflowing_dense_vector_is_absent() {
        let qv = QueryVectors {
            dense: Some(vec![1.0, 1.0]),
            sparse: terms_for("credit"),
        };
        let record = HistoryRecord {
            identifier: 9,
            terms_json: r#"{"credit": 1}"#.to_string(),
            vector_json: "[1e39, 1.0]".to_string(),
        };
        // falls through to the raw terms
        let score = score_history_record(&record, &qv);
        assert!((score - 1.0).abs() < 1e-12, "{}", score);
    }

    #[tokio::test]
    async fn test_similar_history_ranks_ids() {
        let records = vec![
            HistoryRecord {
                identifier: 10,
                terms_json: r#"{"market": 1, "index": 1}"#.to_string(),
                vector_json: "null".to_string(),
            },
            HistoryRecord {
                identifier: 11,
                terms_json: r#"{"fraud": 2, "ring": 1}"#.to_string(),
                vector_json: "null".to_string(),
            },
            HistoryRecord {
                identifier: 12,
                terms_json: "not json".to_string(),
                vector_json: "[0.1, 0.2]".to_string(),
            },
        ];
        let found = similar_history(&NoEmbeddings, &records, "fraud ring", 2).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, 11);
        assert!(found[0].1 > 0.9);
        assert_eq!(found[1].1, 0.0);
    }

    #[test]
    fn test_fuse_empty() {
        assert_eq!(fuse(Vec::new(), &FusionParams::default()), RetrievalResult::empty());
    }

    #[test]
    fn test_history_prefers_dense() {
        let qv = QueryVectors {
            dense: Some(vec![1.0, 0.0]),
            sparse: terms_for("risk"),
        };
        let record = HistoryRecord {
            identifier: 7,
            terms_json: r#"{"risk": 1}"#.to_string(),
            vector_json: "[0.0, 1.0]".to_string(),
        };
        assert_eq!(score_history_record(&record, &qv), 0.0);
    }

    #[test]
    fn test_history_falls_back_to_terms() {
        let qv = sparse_qv("delinquency risk");
        let record = HistoryRecord {
            identifier: 1,
            terms_json: r#"{"delinquency": 3, "risk": 3}"#.to_string(),
            vector_json: "[0.5, 0.5]".to_string(),
        };
        assert!((score_history_record(&record, &qv) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_history_sparse_vector_before_terms() {
        let qv = sparse_qv("fraud");
        let record = HistoryRecord {
            identifier: 1,
            terms_json: r#"{"fraud": 1}"#.to_string(),
            vector_json: r#"{"market": 1.0}"#.to_string(),
        };
        assert_eq!(score_history_record(&record, &qv), 0.0);
    }

    #[test]
    fn test_history_malformed_everything_scores_zero() {
        let qv = sparse_qv("fraud");
        let record = HistoryRecord {
            identifier: 1,
            terms_json: "nope".to_string(),
            vector_json: "{broken".to_string(),
        };
        assert_eq!(score_history_record(&record, &qv), 0.0);
    }

    #[test]
    fn test_knowledge_zeroed_under_dense_query() {
        let qv = QueryVectors {
            dense: Some(vec![1.0]),
            sparse: terms_for("delinquency risk"),
        };
        let snippets = vec!["risk increases with delinquency".to_string()];
        let zeroed = score_knowledge(&snippets, &qv, KnowledgeScoring::ZeroWhenDense);
        assert_eq!(zeroed[0].score, 0.0);
        let scored = score_knowledge(&snippets, &qv, KnowledgeScoring::AlwaysSparse);
        assert!(scored[0].score > 0.0);
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let params = FusionParams {
            top_k: 0,
            ..FusionParams::default()
        };
        assert!(matches!(params.validate(), Err(FusionError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_graph_sources_use_constant_scores() {
        let engine = FusionEngine::new(Arc::new(NoEmbeddings), FusionParams::default())
            .with_graph_csv(Arc::new(FixedGraph(vec!["Company:ACME -[SUPPLIES]→ Company:XYZ"])));
        let result = engine.retrieve(&RetrievalQuery::new("ACME")).await.unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].source, SourceTag::GraphCsv);
        assert_eq!(result.hits[0].score, 0.3);
        assert!(!result.valid);
    }

    struct UnboundedGraph;

    #[async_trait]
    impl GraphSource for UnboundedGraph {
        async fn describe_subject(&self, subject: &str, _limit: usize) -> Result<Vec<String>, SourceError> {
            Ok((0..6).map(|i| format!("Company:{} -[LINKED_TO]→ MarketIndex:{}", subject, i)).collect())
        }
    }

    #[tokio::test]
    async fn test_graph_source_capped_at_top_k() {
        let engine = FusionEngine::new(Arc::new(NoEmbeddings), FusionParams::default())
            .with_graph_csv(Arc::new(UnboundedGraph));
        let (_, outcomes) = engine
            .retrieve_explained(&RetrievalQuery::new("ACME"))
            .await
            .unwrap();
        let csv = outcomes
            .iter()
            .find(|o| matches!(o, SourceOutcome::Hits { source: SourceTag::GraphCsv, .. }));
        assert_eq!(
            csv,
            Some(&SourceOutcome::Hits {
                source: SourceTag::GraphCsv,
                count: 3
            })
        );
    }

    #[tokio::test]
    async fn test_no_sources_is_empty_and_invalid() {
        let engine = FusionEngine::new(Arc::new(NoEmbeddings), FusionParams::default());
        let (result, outcomes) = engine
            .retrieve_explained(&RetrievalQuery::new("anything"))
            .await
            .unwrap();
        assert_eq!(result, RetrievalResult::empty());
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| matches!(o, SourceOutcome::Skipped { .. })));
    }
}
