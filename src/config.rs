use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use risk_rag_core::chunk::ChunkingParams;
use risk_rag_core::embedding::PrefixPolicy;
use risk_rag_core::fusion::{FusionParams, KnowledgeScoring};
use risk_rag_core::store::StoreOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_true")]
    pub prefix_enabled: bool,
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,
    #[serde(default = "default_document_prefix")]
    pub document_prefix: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            prefix_enabled: true,
            query_prefix: default_query_prefix(),
            document_prefix: default_document_prefix(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_true() -> bool {
    true
}
fn default_query_prefix() -> String {
    "query: ".to_string()
}
fn default_document_prefix() -> String {
    "passage: ".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    20
}

impl EmbeddingConfig {
    pub fn prefix_policy(&self) -> PrefixPolicy {
        PrefixPolicy {
            enabled: self.prefix_enabled,
            query_prefix: self.query_prefix.clone(),
            document_prefix: self.document_prefix.clone(),
        }
    }

    /// The credential for the remote provider, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,
    #[serde(default = "default_graph_csv_score")]
    pub graph_csv_score: f64,
    #[serde(default = "default_graph_db_score")]
    pub graph_db_score: f64,
    #[serde(default = "default_knowledge_scoring")]
    pub knowledge_scoring: String,
    #[serde(default = "default_true")]
    pub ann_enabled: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            min_sources: default_min_sources(),
            graph_csv_score: default_graph_csv_score(),
            graph_db_score: default_graph_db_score(),
            knowledge_scoring: default_knowledge_scoring(),
            ann_enabled: true,
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_min_score() -> f64 {
    0.25
}
fn default_min_sources() -> usize {
    2
}
fn default_graph_csv_score() -> f64 {
    0.3
}
fn default_graph_db_score() -> f64 {
    0.4
}
fn default_knowledge_scoring() -> String {
    "zero_when_dense".to_string()
}

impl RetrievalConfig {
    pub fn fusion_params(&self) -> Result<FusionParams> {
        let knowledge_scoring = match self.knowledge_scoring.as_str() {
            "zero_when_dense" => KnowledgeScoring::ZeroWhenDense,
            "always_sparse" => KnowledgeScoring::AlwaysSparse,
            other => anyhow::bail!(
                "Unknown retrieval.knowledge_scoring: '{}'. Must be zero_when_dense or always_sparse.",
                other
            ),
        };
        Ok(FusionParams {
            top_k: self.top_k,
            min_score: self.min_score,
            min_sources: self.min_sources,
            graph_csv_score: self.graph_csv_score,
            graph_db_score: self.graph_db_score,
            knowledge_scoring,
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            ann_enabled: self.ann_enabled,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: default_max_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_max_words() -> usize {
    400
}
fn default_overlap_words() -> usize {
    50
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams {
            max_words: self.max_words,
            overlap_words: self.overlap_words,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KnowledgeConfig {
    /// Curated snippets scored by the knowledge source.
    #[serde(default)]
    pub snippets: Vec<String>,
    /// Directories chunked into the vector store at startup.
    #[serde(default)]
    pub dirs: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    /// Directory containing `relations.csv`.
    #[serde(default)]
    pub csv_dir: Option<PathBuf>,
    #[serde(default)]
    pub neo4j_url: Option<String>,
    #[serde(default)]
    pub neo4j_user: Option<String>,
    #[serde(default = "default_neo4j_password_env")]
    pub neo4j_password_env: String,
    #[serde(default = "default_neo4j_database")]
    pub neo4j_database: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            csv_dir: None,
            neo4j_url: None,
            neo4j_user: None,
            neo4j_password_env: default_neo4j_password_env(),
            neo4j_database: default_neo4j_database(),
        }
    }
}

fn default_neo4j_password_env() -> String {
    "NEO4J_PASSWORD".to_string()
}
fn default_neo4j_database() -> String {
    "neo4j".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.min_sources < 1 {
        anyhow::bail!("retrieval.min_sources must be >= 1");
    }
    if !config.retrieval.min_score.is_finite() {
        anyhow::bail!("retrieval.min_score must be a finite number");
    }
    config.retrieval.fusion_params()?;

    // Validate chunking
    if config.chunking.max_words == 0 {
        anyhow::bail!("chunking.max_words must be > 0");
    }
    if config.chunking.overlap_words >= config.chunking.max_words {
        anyhow::bail!("chunking.overlap_words must be < chunking.max_words");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "remote" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, remote, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    Ok(config)
}
