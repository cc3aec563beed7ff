//! Exact flat L2 vector index over document embeddings.

use std::cmp::Ordering;

/// A single nearest-neighbour hit: row in the index and its distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    pub row: usize,
    pub distance: f64,
}

/// Brute-force index storing embeddings row-major in one contiguous buffer.
///
/// Distances are squared Euclidean, as returned by a flat L2 index.
#[derive(Debug, Clone, Default)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f64>,
}

impl FlatL2Index {
    /// Build an index from embeddings. Row `i` corresponds to `embeddings[i]`.
    ///
    /// All embeddings must share one dimension; the store enforces this on
    /// insertion.
    pub fn build<'a, I>(dimension: usize, embeddings: I) -> Self
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        let mut data = Vec::new();
        for emb in embeddings {
            debug_assert_eq!(emb.len(), dimension);
            data.extend_from_slice(emb);
        }
        Self { dimension, data }
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return up to `k` rows closest to `query`, nearest first.
    ///
    /// Equal distances keep row order. Non-finite distances sort last.
    pub fn search(&self, query: &[f64], k: usize) -> Vec<IndexHit> {
        if k == 0 || self.is_empty() || query.len() != self.dimension {
            return Vec::new();
        }

        let mut hits: Vec<IndexHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, emb)| IndexHit {
                row,
                distance: squared_l2(query, emb),
            })
            .collect();

        hits.sort_by(|a, b| compare_distance(a.distance, b.distance));
        hits.truncate(k);
        hits
    }
}

fn squared_l2(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn compare_distance(a: f64, b: f64) -> Ordering {
    match (a.is_finite(), b.is_finite()) {
        (true, true) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    }
}

/// Convert a distance into a similarity in `(0, 1]`.
#[inline]
pub fn distance_to_similarity(distance: f64) -> f64 {
    if distance.is_finite() && distance >= 0.0 {
        1.0 / (1.0 + distance)
    } else {
        0.0
    }
}
