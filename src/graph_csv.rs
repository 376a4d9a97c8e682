//! Tabular relationship graph loaded from `relations.csv`.
//!
//! Expected header: `src_type,src_id,rel,dst_type,dst_id` (any column order;
//! extra columns are ignored). Each edge is rendered as
//! `Company:AAPL -[LINKED_TO]→ MarketIndex:SPX`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

use risk_rag_core::error::SourceError;
use risk_rag_core::sources::GraphSource;

pub const RELATIONS_FILE: &str = "relations.csv";

/// Node type assumed when a subject carries no `Type:` prefix.
const DEFAULT_SUBJECT_TYPE: &str = "Company";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub src_type: String,
    pub src_id: String,
    pub rel: String,
    pub dst_type: String,
    pub dst_id: String,
}

impl Edge {
    pub fn describe(&self) -> String {
        format!(
            "{}:{} -[{}]→ {}:{}",
            self.src_type, self.src_id, self.rel, self.dst_type, self.dst_id
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct CsvGraph {
    edges: Vec<Edge>,
}

impl CsvGraph {
    /// Load `relations.csv` from `dir`. A missing file is an empty graph.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(RELATIONS_FILE);
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no relations file, graph is empty");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read relations file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let Some(header) = lines.next() else {
            return Ok(Self::default());
        };

        let columns: Vec<String> = split_record(header.trim_start_matches('\u{feff}'));
        let col = |name: &str| -> Result<usize> {
            columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| anyhow::anyhow!("relations.csv is missing column '{}'", name))
        };
        let (src_type, src_id, rel, dst_type, dst_id) = (
            col("src_type")?,
            col("src_id")?,
            col("rel")?,
            col("dst_type")?,
            col("dst_id")?,
        );

        let edges = lines
            .map(|line| {
                let fields = split_record(line);
                let field = |i: usize| fields.get(i).cloned().unwrap_or_default();
                Edge {
                    src_type: field(src_type),
                    src_id: field(src_id),
                    rel: field(rel),
                    dst_type: field(dst_type),
                    dst_id: field(dst_id),
                }
            })
            .collect();

        Ok(Self { edges })
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Outgoing edges of one node, in file order.
    pub fn neighbors<'a>(&'a self, src_type: &'a str, src_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.src_type == src_type && e.src_id == src_id)
    }

    pub fn describe_company(&self, symbol: &str, limit: usize) -> Vec<String> {
        self.describe_node("Company", symbol, limit)
    }

    pub fn describe_account(&self, account_id: &str, limit: usize) -> Vec<String> {
        self.describe_node("Account", account_id, limit)
    }

    fn describe_node(&self, node_type: &str, id: &str, limit: usize) -> Vec<String> {
        self.neighbors(node_type, id)
            .take(limit)
            .map(Edge::describe)
            .collect()
    }
}

/// Split `"Account:42"` into `("Account", "42")`; bare ids are companies.
pub fn split_subject(subject: &str) -> (&str, &str) {
    match subject.split_once(':') {
        Some((ty, id)) if !ty.is_empty() && !id.is_empty() && !ty.contains(char::is_whitespace) => {
            (ty, id)
        }
        _ => (DEFAULT_SUBJECT_TYPE, subject),
    }
}

#[async_trait]
impl GraphSource for CsvGraph {
    async fn describe_subject(&self, subject: &str, limit: usize) -> Result<Vec<String>, SourceError> {
        let (node_type, id) = split_subject(subject.trim());
        Ok(self.describe_node(node_type, id, limit))
    }
}

/// Split one CSV record, honouring double-quoted fields and `""` escapes.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}
