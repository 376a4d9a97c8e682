//! Vector representations and similarity scoring.
//!
//! Evidence can carry a dense embedding, a sparse term-frequency map, or
//! nothing at all. [`Vector`] makes the three cases explicit and
//! [`score`] / [`score_with_fallback`] implement the reconciliation
//! policy as a plain match over the pair:
//!
//! | query  | candidate | result                                   |
//! |--------|-----------|------------------------------------------|
//! | Dense  | Dense     | [`cosine_dense`]                         |
//! | Sparse | Sparse    | [`cosine_sparse`]                        |
//! | Sparse | Dense     | sparse fallback of the candidate, or 0.0 |
//! | other  | other     | 0.0                                      |
//!
//! No representation is ever projected into the other's space.

use serde::{Deserialize, Serialize};

use crate::sparse::TermVector;

/// Dense embedding; comparable only with vectors of equal length.
pub type DenseVector = Vec<f32>;

/// A vector in one of the supported representations.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Vector {
    Dense(DenseVector),
    Sparse(TermVector),
    #[default]
    Absent,
}

impl Vector {
    pub fn as_dense(&self) -> Option<&[f32]> {
        match self {
            Vector::Dense(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sparse(&self) -> Option<&TermVector> {
        match self {
            Vector::Sparse(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Vector::Absent)
    }

    /// Dense dimensionality, `None` for non-dense vectors.
    pub fn dims(&self) -> Option<usize> {
        self.as_dense().map(|v| v.len())
    }
}

/// Cosine similarity between two dense vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` when either vector is empty,
/// the lengths differ, either has zero norm, or the result is not finite. Mismatched lengths are
/// expected when sources carry vectors from different model generations,
/// so they score zero rather than erroring.
pub fn cosine_dense(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let cos = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !cos.is_finite() {
        return 0.0;
    }
    cos.clamp(-1.0, 1.0)
}

/// Cosine similarity between two sparse term maps.
///
/// Dot product over shared keys divided by the product of L2 norms.
/// `0.0` for empty maps, zero norms or a non-finite result.
pub fn cosine_sparse(a: &TermVector, b: &TermVector) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    // Iterate the smaller map; lookups go to the larger one.
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(k, v)| large.get(k).map(|w| v * w))
        .sum();

    let na = a.l2_norm();
    let nb = b.l2_norm();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }

    let cos = dot / (na * nb);
    if cos.is_finite() {
        cos
    } else {
        0.0
    }
}

/// Score a candidate against a query of possibly different representation.
pub fn score(query: &Vector, candidate: &Vector) -> f64 {
    match (query, candidate) {
        (Vector::Dense(q), Vector::Dense(c)) => cosine_dense(q, c),
        (Vector::Sparse(q), Vector::Sparse(c)) => cosine_sparse(q, c),
        _ => 0.0,
    }
}

/// Like [`score`], but a sparse query may fall back to the candidate's
/// same-kind sparse vector when the primary representations differ.
pub fn score_with_fallback(
    query: &Vector,
    candidate: &Vector,
    candidate_fallback: Option<&TermVector>,
) -> f64 {
    match (query, candidate, candidate_fallback) {
        (Vector::Dense(q), Vector::Dense(c), _) => cosine_dense(q, c),
        (Vector::Sparse(q), Vector::Sparse(c), _) => cosine_sparse(q, c),
        (Vector::Sparse(q), _, Some(fallback)) => cosine_sparse(q, fallback),
        _ => 0.0,
    }
}

/// Shape of a vector as serialized by the historical-record store.
///
/// A JSON array is a dense embedding, a JSON object a sparse weight map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredVector {
    Dense(DenseVector),
    Sparse(TermVector),
}

/// Parse a stored vector; malformed or `null` input is [`Vector::Absent`].
///
/// A dense vector with any non-finite component (including values that
/// overflow `f32`) is malformed.
pub fn parse_vector_json(json: &str) -> Vector {
    match serde_json::from_str::<Option<StoredVector>>(json) {
        Ok(Some(StoredVector::Dense(v))) if v.iter().all(|x| x.is_finite()) => Vector::Dense(v),
        Ok(Some(StoredVector::Dense(_))) => {
            tracing::debug!("stored dense vector has non-finite components, treating as absent");
            Vector::Absent
        }
        Ok(Some(StoredVector::Sparse(t))) => Vector::Sparse(t),
        Ok(None) => Vector::Absent,
        Err(e) => {
            tracing::debug!(error = %e, "stored vector is malformed, treating as absent");
            Vector::Absent
        }
    }
}

/// Parse stored raw term counts; anything but a JSON object is `None`.
pub fn parse_terms_json(json: &str) -> Option<TermVector> {
    serde_json::from_str::<TermVector>(json).ok()
}

/// Serialize a vector into the historical-record storage format.
///
/// `Absent` is stored as `null`.
pub fn vector_to_json(vector: &Vector) -> String {
    let stored = match vector {
        Vector::Dense(v) => Some(StoredVector::Dense(v.clone())),
        Vector::Sparse(t) => Some(StoredVector::Sparse(t.clone())),
        Vector::Absent => None,
    };
    serde_json::to_string(&stored).unwrap_or_else(|_| "null".to_string())
}
