//! Inner-product nearest-neighbour index over unit-normalized vectors.
//!
//! The index is a derived cache of the vector store: it holds a copy of
//! every dense vector whose dimensionality matches the first one inserted,
//! normalized to unit length, plus the position of the owning item in the
//! store's canonical list. Searching a normalized query against it ranks
//! by cosine similarity.

/// Added to norms before division so zero vectors stay finite.
const NORM_EPSILON: f32 = 1e-12;

/// Neighbour returned by [`InnerProductIndex::search`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the item in the owning store.
    pub position: usize,
    /// Inner product of the normalized vectors.
    pub score: f64,
}

/// Flat inner-product index with fixed dimensionality.
#[derive(Debug, Clone)]
pub struct InnerProductIndex {
    dims: usize,
    rows: Vec<Vec<f32>>,
    positions: Vec<usize>,
}

impl InnerProductIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            rows: Vec::new(),
            positions: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert a vector owned by the item at `position`.
    ///
    /// Returns `false` (and stores nothing) when the dimensionality differs
    /// from the index's.
    pub fn insert(&mut self, position: usize, vector: &[f32]) -> bool {
        if vector.len() != self.dims {
            return false;
        }
        self.rows.push(unit(vector));
        self.positions.push(position);
        true
    }

    /// Up to `k` neighbours by descending inner product.
    ///
    /// Ties keep insertion order. A query of the wrong dimensionality
    /// returns nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if query.len() != self.dims || k == 0 {
            return Vec::new();
        }
        let q = unit(query);
        let mut scored: Vec<Neighbor> = self
            .rows
            .iter()
            .zip(&self.positions)
            .map(|(row, &position)| Neighbor {
                position,
                score: dot(&q, row),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

fn unit(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt() + NORM_EPSILON;
    v.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum()
}
