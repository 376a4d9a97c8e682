//! Library-level tests: real SQLite history, CSV graph and directory
//! ingestion feeding the fusion engine.

use async_trait::async_trait;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use risk_rag::db;
use risk_rag::graph_csv::CsvGraph;
use risk_rag::history::SqliteHistoryStore;
use risk_rag::ingest;
use risk_rag_core::embedding::{EmbedRole, EmbeddingProvider, NoEmbeddings};
use risk_rag_core::fusion::{score_history_record, FusionEngine, FusionParams, QueryVectors, RetrievalQuery};
use risk_rag_core::models::SourceTag;
use risk_rag_core::sources::HistoryStore;
use risk_rag_core::sparse::terms_for;
use risk_rag_core::vector::{cosine_dense, DenseVector};

/// Three-dimensional "topic" embedder: credit, market, fraud keyword counts.
struct TopicEmbedder;

fn topic_vector(text: &str) -> DenseVector {
    let lower = text.to_lowercase();
    let count = |w: &str| lower.matches(w).count() as f32;
    vec![
        count("credit") + count("delinquen") + 0.1,
        count("market") + count("index") + 0.1,
        count("fraud") + 0.1,
    ]
}

#[async_trait]
impl EmbeddingProvider for TopicEmbedder {
    fn model_name(&self) -> &str {
        "topics"
    }

    async fn embed_one(&self, text: &str, _role: EmbedRole) -> Option<DenseVector> {
        if text.trim().is_empty() {
            None
        } else {
            Some(topic_vector(text))
        }
    }

    async fn embed_batch(&self, texts: &[String], role: EmbedRole) -> Option<Vec<Option<DenseVector>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed_one(t, role).await);
        }
        Some(out)
    }
}

async fn history_in(tmp: &TempDir) -> SqliteHistoryStore {
    let pool = db::connect_path(&tmp.path().join("rag.sqlite")).await.unwrap();
    let history = SqliteHistoryStore::new(pool);
    history.init().await.unwrap();
    history
}

fn write_assessments(tmp: &TempDir) -> std::path::PathBuf {
    let dir = tmp.path().join("assessments");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("01.txt"), "credit delinquency rising in consumer credit").unwrap();
    fs::write(dir.join("02.txt"), "market index drawdown").unwrap();
    fs::write(dir.join("03.md"), "fraud ring on shared devices").unwrap();
    dir
}

#[tokio::test]
async fn test_dense_vectors_survive_history_round_trip() {
    let tmp = TempDir::new().unwrap();
    let history = history_in(&tmp).await;
    let dir = write_assessments(&tmp);

    let report = ingest::embed_directory(&TopicEmbedder, &history, &dir, 500)
        .await
        .unwrap();
    assert_eq!(report.files, 3);
    assert_eq!(report.dense, 3);
    assert_eq!(report.total_rows, 3);

    let query = "credit delinquency";
    let qv = QueryVectors {
        dense: Some(topic_vector(query)),
        sparse: terms_for(query),
    };

    let records = history.all_records().await.unwrap();
    let texts = [
        "credit delinquency rising in consumer credit",
        "market index drawdown",
        "fraud ring on shared devices",
    ];
    for (record, text) in records.iter().zip(texts) {
        let direct = cosine_dense(&topic_vector(query), &topic_vector(text));
        let stored = score_history_record(record, &qv);
        assert!((direct - stored).abs() < 1e-9, "{} vs {}", direct, stored);
    }
    assert_eq!(records[0].identifier, 500);
    assert_eq!(records[2].identifier, 502);
}

#[tokio::test]
async fn test_engine_over_sqlite_and_csv() {
    let tmp = TempDir::new().unwrap();
    let history = history_in(&tmp).await;
    let dir = write_assessments(&tmp);
    ingest::embed_directory(&NoEmbeddings, &history, &dir, 1).await.unwrap();

    let graph = CsvGraph::parse(
        "src_type,src_id,rel,dst_type,dst_id\nCompany,ACME,LINKED_TO,MarketIndex,SPX\n",
    )
    .unwrap();

    let engine = FusionEngine::new(Arc::new(NoEmbeddings), FusionParams::default())
        .with_history(Arc::new(history))
        .with_graph_csv(Arc::new(graph));

    let query = RetrievalQuery::new("market index drawdown").with_subject("ACME");
    let first = engine.retrieve(&query).await.unwrap();
    let second = engine.retrieve(&query).await.unwrap();

    assert!(first.valid);
    assert_eq!(first.hits.len(), 3);
    assert_eq!(first.hits[0].source, SourceTag::History);
    assert_eq!(first.hits[0].identifier.as_deref(), Some("2"));
    assert!((first.hits[0].score - 1.0).abs() < 1e-9);
    assert_eq!(first.hits[1].source, SourceTag::GraphCsv);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_history_table_degrades_to_other_sources() {
    let tmp = TempDir::new().unwrap();
    // no init: the embeddings table does not exist
    let pool = db::connect_path(&tmp.path().join("bare.sqlite")).await.unwrap();
    let history = SqliteHistoryStore::new(pool);

    let engine = FusionEngine::new(Arc::new(NoEmbeddings), FusionParams::default())
        .with_history(Arc::new(history))
        .with_knowledge(Arc::new(vec!["risk increases with delinquency".to_string()]));

    let (result, outcomes) = engine
        .retrieve_explained(&RetrievalQuery::new("delinquency risk"))
        .await
        .unwrap();

    assert_eq!(result.hits.len(), 1);
    assert_eq!(result.hits[0].source, SourceTag::Knowledge);
    assert!(result.hits[0].score > 0.0);
    assert!(!result.valid);
    assert!(matches!(
        outcomes[0],
        risk_rag_core::error::SourceOutcome::Failed { source: SourceTag::History, .. }
    ));
}

#[tokio::test]
async fn test_dense_store_from_directory() {
    let tmp = TempDir::new().unwrap();
    let dir = write_assessments(&tmp);
    let store = risk_rag_core::store::ChunkedVectorStore::new(
        Arc::new(TopicEmbedder),
        risk_rag_core::store::StoreOptions::default(),
    );

    let added = ingest::add_directory(&store, &dir, &Default::default()).await.unwrap();
    assert_eq!(added, 3);
    assert_eq!(store.indexed_len(), 3);

    let found = store.search("fraud", 1).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].item.text.as_deref(), Some("fraud ring on shared devices"));
}
