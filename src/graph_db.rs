//! Live graph database over the Neo4j HTTP transactional API.
//!
//! Queries go to `POST {url}/db/{database}/tx/commit` with basic auth. The
//! client counts as available only when a URL, user and password are all
//! configured; otherwise the fusion engine skips it without a request.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use risk_rag_core::error::SourceError;
use risk_rag_core::sources::{GraphDatabase, GraphSource};

use crate::config::GraphConfig;
use crate::graph_csv::split_subject;

const COMPANY_INDEX_QUERY: &str = "MATCH (c:Company {symbol:$symbol})-[r:LINKED_TO_INDEX]->(m:MarketIndex) \
     RETURN m.name AS name, r.correlation AS corr LIMIT $lim";
const COMPANY_NEWS_QUERY: &str = "MATCH (c:Company {symbol:$symbol})-[r:HAS_RISK_EVENT]->(n:News) \
     RETURN n.title AS title, r.impact AS impact LIMIT $lim";
const ACCOUNT_QUERY: &str = "MATCH (a:Account {id:$id})-[r:REL]->(b) \
     RETURN labels(b) AS labels, b.id AS bid, r.type AS rel LIMIT $lim";

struct Credentials {
    endpoint: String,
    user: String,
    password: String,
}

pub struct Neo4jGraph {
    credentials: Option<Credentials>,
    client: reqwest::Client,
}

impl Neo4jGraph {
    /// Build from config. Missing settings make the graph unavailable rather
    /// than failing.
    pub fn new(config: &GraphConfig, timeout: Duration) -> Result<Self> {
        let password = std::env::var(&config.neo4j_password_env)
            .ok()
            .filter(|p| !p.is_empty());

        let credentials = match (&config.neo4j_url, &config.neo4j_user, password) {
            (Some(url), Some(user), Some(password)) => Some(Credentials {
                endpoint: format!(
                    "{}/db/{}/tx/commit",
                    url.trim_end_matches('/'),
                    config.neo4j_database
                ),
                user: user.clone(),
                password,
            }),
            (Some(_), _, _) => {
                tracing::warn!(
                    env = %config.neo4j_password_env,
                    "neo4j_url is set but user or password is missing, graph database disabled"
                );
                None
            }
            _ => None,
        };

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { credentials, client })
    }

    /// Run one Cypher statement and return its rows.
    async fn run(&self, statement: &str, parameters: serde_json::Value) -> Result<Vec<Vec<serde_json::Value>>> {
        let Some(creds) = &self.credentials else {
            bail!("graph database not configured");
        };

        let body = serde_json::json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });

        let response = self
            .client
            .post(&creds.endpoint)
            .basic_auth(&creds.user, Some(&creds.password))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Neo4j error {}: {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_rows(&json)
    }

    /// Index links first, then risk events; at most `limit` lines in total.
    pub async fn describe_company(&self, symbol: &str, limit: usize) -> Result<Vec<String>> {
        let params = serde_json::json!({ "symbol": symbol, "lim": limit });
        let mut out = Vec::new();

        for row in self.run(COMPANY_INDEX_QUERY, params.clone()).await? {
            let name = text_or(row.first(), "Index");
            let corr = text_or(row.get(1), "");
            out.push(format!(
                "Company:{} -[LINKED_TO_INDEX corr={}]→ MarketIndex:{}",
                symbol, corr, name
            ));
        }
        for row in self.run(COMPANY_NEWS_QUERY, params).await? {
            let title = text_or(row.first(), "News");
            let impact = text_or(row.get(1), "");
            out.push(format!(
                "Company:{} -[HAS_RISK_EVENT impact={}]→ News:{}",
                symbol, impact, title
            ));
        }

        out.truncate(limit);
        Ok(out)
    }

    pub async fn describe_account(&self, account_id: &str, limit: usize) -> Result<Vec<String>> {
        let params = serde_json::json!({ "id": account_id, "lim": limit });
        let rows = self.run(ACCOUNT_QUERY, params).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let label = row
                    .first()
                    .and_then(|l| l.as_array())
                    .and_then(|l| l.first())
                    .and_then(|l| l.as_str())
                    .unwrap_or("Node");
                let bid = text_or(row.get(1), "");
                let rel = text_or(row.get(2), "");
                format!("Account:{} -[{}]→ {}:{}", account_id, rel, label, bid)
            })
            .collect())
    }
}

#[async_trait]
impl GraphSource for Neo4jGraph {
    async fn describe_subject(&self, subject: &str, limit: usize) -> Result<Vec<String>, SourceError> {
        let (node_type, id) = split_subject(subject.trim());
        let result = match node_type {
            "Account" => self.describe_account(id, limit).await,
            _ => self.describe_company(id, limit).await,
        };
        result.map_err(|e| SourceError::query_failed(format!("neo4j: {:#}", e)))
    }
}

impl GraphDatabase for Neo4jGraph {
    fn is_available(&self) -> bool {
        self.credentials.is_some()
    }
}

/// Extract `results[0].data[*].row` from a transactional API response.
fn parse_rows(json: &serde_json::Value) -> Result<Vec<Vec<serde_json::Value>>> {
    if let Some(errors) = json.get("errors").and_then(|e| e.as_array()) {
        if let Some(first) = errors.first() {
            let message = first
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            bail!("Neo4j query failed: {}", message);
        }
    }

    let data = json
        .get("results")
        .and_then(|r| r.as_array())
        .and_then(|r| r.first())
        .and_then(|r| r.get("data"))
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Neo4j response: missing results data"))?;

    Ok(data
        .iter()
        .filter_map(|d| d.get("row").and_then(|r| r.as_array()).cloned())
        .collect())
}

/// Render a scalar cell; null or missing falls back to `default`.
fn text_or(value: Option<&serde_json::Value>, default: &str) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows() {
        let json = serde_json::json!({
            "results": [{
                "columns": ["name", "corr"],
                "data": [{"row": ["S&P 500", 0.82]}, {"row": ["NASDAQ", null]}]
            }],
            "errors": []
        });
        let rows = parse_rows(&json).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(text_or(rows[0].first(), "Index"), "S&P 500");
        assert_eq!(text_or(rows[0].get(1), ""), "0.82");
        assert_eq!(text_or(rows[1].get(1), ""), "");
    }

    #[test]
    fn test_parse_rows_surfaces_errors() {
        let json = serde_json::json!({
            "results": [],
            "errors": [{"code": "Neo.ClientError", "message": "bad cypher"}]
        });
        let err = parse_rows(&json).unwrap_err();
        assert!(err.to_string().contains("bad cypher"));
    }

    #[test]
    fn test_unconfigured_is_unavailable() {
        let graph = Neo4jGraph::new(&GraphConfig::default(), Duration::from_secs(1)).unwrap();
        assert!(!graph.is_available());

        let config = GraphConfig {
            neo4j_url: Some("http://localhost:7474".to_string()),
            neo4j_user: Some("neo4j".to_string()),
            neo4j_password_env: "RISK_RAG_TEST_NEO4J_PASSWORD_NEVER_SET".to_string(),
            ..GraphConfig::default()
        };
        let graph = Neo4jGraph::new(&config, Duration::from_secs(1)).unwrap();
        assert!(!graph.is_available());
    }

    #[tokio::test]
    async fn test_unconfigured_query_fails_as_source_error() {
        let graph = Neo4jGraph::new(&GraphConfig::default(), Duration::from_secs(1)).unwrap();
        let err = graph.describe_subject("AAPL", 3).await.unwrap_err();
        assert!(matches!(err, SourceError::QueryFailed { .. }));
    }
}
