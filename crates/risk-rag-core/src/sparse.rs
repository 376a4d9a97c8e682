//! Sparse term-frequency vectors.
//!
//! The sparse representation is the fallback every other part of the
//! engine can rely on: it needs no model, no network, and never fails.
//!
//! # Example
//!
//! ```rust
//! use risk_rag_core::sparse::{build_terms, normalize};
//!
//! let counts = build_terms(Some("Risk, risk and more RISK!"));
//! assert_eq!(counts.get("risk"), Some(3.0));
//!
//! let tf = normalize(&counts);
//! assert!((tf.get("risk").unwrap() - 0.6).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from normalized token to weight.
///
/// Backed by a `BTreeMap` so iteration (and therefore float summation)
/// order is the same on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermVector(BTreeMap<String, f64>);

impl TermVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, term: &str) -> Option<f64> {
        self.0.get(term).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Euclidean norm of the weights.
    pub fn l2_norm(&self) -> f64 {
        self.0.values().map(|v| v * v).sum::<f64>().sqrt()
    }
}

impl FromIterator<(String, f64)> for TermVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Tokenize text into raw term counts.
///
/// Lower-cases the text, splits on whitespace, strips every
/// non-alphanumeric character from each token and drops tokens that end up
/// empty. `None` and `""` both yield an empty vector.
pub fn build_terms(text: Option<&str>) -> TermVector {
    let mut counts: BTreeMap<String, f64> = BTreeMap::new();
    let Some(text) = text else {
        return TermVector(counts);
    };

    for raw in text.to_lowercase().split_whitespace() {
        let token: String = raw.chars().filter(|c| c.is_alphanumeric()).collect();
        if token.is_empty() {
            continue;
        }
        *counts.entry(token).or_insert(0.0) += 1.0;
    }

    TermVector(counts)
}

/// Divide every count by the total count.
///
/// Returns an empty vector when the total is zero.
pub fn normalize(terms: &TermVector) -> TermVector {
    let total = terms.total();
    if total == 0.0 {
        return TermVector::new();
    }
    terms
        .0
        .iter()
        .map(|(k, v)| (k.clone(), v / total))
        .collect()
}

/// `normalize(build_terms(text))`, the canonical sparse form used for scoring.
pub fn terms_for(text: &str) -> TermVector {
    normalize(&build_terms(Some(text)))
}
