// Exact nearest-neighbour index
// Brute-force squared-L2 search over a flat, row-major embedding matrix


use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;

use crate::{Result, SemanticError};

/// Immutable brute-force index over a fixed set of embedding vectors
///
/// Position `i` in the index always refers to the `i`-th vector passed to
/// [`FlatIndex::build`]; the index is never reordered after construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    len: usize,
    values: Vec<f32>,
}

/// A single search hit: a position in the index and its squared L2 distance
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

impl FlatIndex {
    /// Build an index over `vectors`, keeping their order
    ///
    /// # Arguments
    /// * `vectors` - Embedding vectors, all of the same length
    ///
    /// # Returns
    /// * `Result<Self>` - The index, `DimensionMismatch` if the vectors
    ///   disagree on their length, or `ZeroDimension` if they are empty
    #[inline]
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self> {
        let Some(first) = vectors.first() else {
            return Ok(Self::default());
        };

        let dimension = first.len();
        if dimension == 0 {
            return Err(SemanticError::ZeroDimension);
        }

        let mut values = Vec::with_capacity(vectors.len() * dimension);
        for vector in vectors {
            if vector.len() != dimension {
                return Err(SemanticError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            values.extend_from_slice(vector);
        }

        debug!(
            "Built flat index with {} vectors of {} dimensions",
            vectors.len(),
            dimension
        );

        Ok(Self {
            dimension,
            len: vectors.len(),
            values,
        })
    }

    /// Number of vectors in the index
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Dimensionality of the stored vectors, `None` for an empty index
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        (!self.is_empty()).then_some(self.dimension)
    }

    /// Stored vector at `position`
    #[inline]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len {
            return None;
        }
        let start = position * self.dimension;
        self.values.get(start..start + self.dimension)
    }

    /// Find the `k` stored vectors closest to `query` by squared L2 distance
    ///
    /// Results are ordered by ascending distance, ties broken by ascending
    /// position. At most `min(k, len)` neighbours are returned; `k == 0` and an
    /// empty index both yield no results.
    ///
    /// # Arguments
    /// * `query` - Query vector, must match the index dimension
    /// * `k` - Maximum number of neighbours to return
    ///
    /// # Returns
    /// * `Result<Vec<Neighbor>>` - Neighbours, or `DimensionMismatch`
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        if query.len() != self.dimension {
            return Err(SemanticError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Neighbor> = self
            .values
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, stored)| Neighbor {
                position,
                distance: squared_l2(stored, query),
            })
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, compare_neighbors);
            scored.truncate(k);
        }
        scored.sort_unstable_by(compare_neighbors);

        Ok(scored)
    }
}

/// Squared Euclidean distance between two equal-length vectors
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.position.cmp(&b.position))
}
