use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Past assessments
    let assessments = root.join("assessments");
    fs::create_dir_all(&assessments).unwrap();
    fs::write(
        assessments.join("a1.txt"),
        "Delinquency risk rising across the retail credit book.",
    )
    .unwrap();
    fs::write(
        assessments.join("a2.md"),
        "# Market note\n\nIndex volatility elevated; liquidity stable.",
    )
    .unwrap();
    fs::write(assessments.join("ignored.pdf"), "not ingested").unwrap();

    // Knowledge documents for the vector store
    let docs = root.join("knowledge_docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("fraud.md"),
        "Fraud ring detection relies on shared devices and shared emails between accounts.",
    )
    .unwrap();

    // Relationship graph
    let graph = root.join("graph_data");
    fs::create_dir_all(&graph).unwrap();
    fs::write(
        graph.join("relations.csv"),
        "src_type,src_id,rel,dst_type,dst_id\n\
         Company,AAPL,LINKED_TO,MarketIndex,SPX\n\
         Account,42,USES_DEVICE,Device,d-9\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/rag.sqlite"

[embedding]
provider = "disabled"

[retrieval]
top_k = 3
min_score = 0.25
min_sources = 2

[knowledge]
snippets = ["risk increases with delinquency"]
dirs = ["{root}/knowledge_docs"]

[graph]
csv_dir = "{root}/graph_data"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn retrieve_json(config_path: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["retrieve"];
    full.extend_from_slice(args);
    let (stdout, stderr, success) = run_rag(config_path, &full);
    assert!(success, "retrieve failed: stdout={}, stderr={}", stdout, stderr);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("bad JSON ({}): {}", e, stdout))
}

fn hit_sources(result: &serde_json::Value) -> Vec<String> {
    result["hits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["source"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rag(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("rag.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_rag(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_rag(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_embed_dir_and_count() {
    let (tmp, config_path) = setup_test_env();
    let dir = tmp.path().join("assessments");

    let (stdout, stderr, success) = run_rag(
        &config_path,
        &["embed-dir", "--dir", dir.to_str().unwrap(), "--offset", "1000"],
    );
    assert!(success, "embed-dir failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files: 2"), "got: {}", stdout);
    assert!(stdout.contains("dense: 0"));
    assert!(stdout.contains("ids: 1000..=1001"));

    let (stdout, _, success) = run_rag(&config_path, &["history", "count"]);
    assert!(success);
    assert_eq!(stdout.trim(), "2");

    let (stdout, _, success) = run_rag(&config_path, &["history", "clear"]);
    assert!(success);
    assert!(stdout.contains("rows removed: 2"));
}

#[test]
fn test_history_similar_returns_best_ids() {
    let (tmp, config_path) = setup_test_env();
    let dir = tmp.path().join("assessments");
    run_rag(
        &config_path,
        &["embed-dir", "--dir", dir.to_str().unwrap(), "--offset", "1000"],
    );

    let (stdout, stderr, success) = run_rag(
        &config_path,
        &["history", "similar", "delinquency risk", "--top-k", "1"],
    );
    assert!(success, "history similar failed: stdout={}, stderr={}", stdout, stderr);
    let rows: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], 1000);
    assert!(rows[0]["score"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_ingest_reports_chunks() {
    let (tmp, config_path) = setup_test_env();
    let dir = tmp.path().join("knowledge_docs");

    let (stdout, stderr, success) = run_rag(&config_path, &["ingest", dir.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("chunks: 1"), "got: {}", stdout);
    assert!(stdout.contains("provider: disabled"));
}

#[test]
fn test_retrieve_multi_source_is_valid() {
    let (tmp, config_path) = setup_test_env();
    let dir = tmp.path().join("assessments");
    run_rag(&config_path, &["embed-dir", "--dir", dir.to_str().unwrap()]);

    let result = retrieve_json(&config_path, &["delinquency risk", "--subject", "AAPL"]);
    assert_eq!(result["valid"], serde_json::json!(true), "got: {}", result);

    // knowledge ≈ 0.71, history = 0.5, graph_csv = 0.3
    let sources = hit_sources(&result);
    assert_eq!(sources, vec!["knowledge", "history", "graph_csv"]);

    let scores: Vec<f64> = result["hits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["score"].as_f64().unwrap())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_retrieve_vector_only_is_invalid() {
    let (_tmp, config_path) = setup_test_env();

    let result = retrieve_json(&config_path, &["fraud ring devices", "--subject", "NONE"]);
    assert_eq!(result["valid"], serde_json::json!(false), "got: {}", result);
    let sources = hit_sources(&result);
    assert!(sources.contains(&"vector".to_string()));
}

#[test]
fn test_retrieve_explain_lists_sources() {
    let (_tmp, config_path) = setup_test_env();

    let result = retrieve_json(&config_path, &["market index", "--explain", "--top-k", "1"]);
    let sources = result["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 5);
    let neo4j = sources
        .iter()
        .find(|s| s["source"] == "graph_neo4j")
        .unwrap();
    assert_eq!(neo4j["status"], "skipped");
    assert!(result["hits"].as_array().unwrap().len() <= 1);
}

#[test]
fn test_retrieve_deterministic() {
    let (tmp, config_path) = setup_test_env();
    let dir = tmp.path().join("assessments");
    run_rag(&config_path, &["embed-dir", "--dir", dir.to_str().unwrap()]);

    let first = retrieve_json(&config_path, &["index volatility", "--subject", "AAPL"]);
    let second = retrieve_json(&config_path, &["index volatility", "--subject", "AAPL"]);
    assert_eq!(first, second);
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config").join("bad.toml");
    fs::write(&bad, "[db]\npath = \"x.sqlite\"\n[retrieval]\ntop_k = 0\n").unwrap();

    let (_, stderr, success) = run_rag(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("top_k"), "got: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_rag(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
