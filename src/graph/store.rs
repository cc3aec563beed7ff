//! Document/graph store.
//!
//! Holds every [`EntityDocument`] keyed by id, serves vector similarity search
//! through a lazily rebuilt [`FlatL2Index`], and builds normalized weighted
//! adjacency matrices over arbitrary candidate subsets of the graph.

use crate::embedding::{Embedder, EmbeddingError};
use crate::graph::document::{EntityDocument, EntityMetadata, NeighborEdge};
use crate::graph::index::{FlatL2Index, distance_to_similarity};
use crate::graph::normalize::finite_or_zero;
use ndarray::Array2;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Row sums at or below this are treated as zero during normalization.
const DEGREE_EPSILON: f64 = 1e-12;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by the document/graph store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A document's embedding does not match the store's dimension.
    #[error("Embedding dimension mismatch for '{id}': expected {expected}, got {got}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        got: usize,
    },

    /// The same id appeared twice in a candidate list.
    #[error("Duplicate candidate id: {0}")]
    DuplicateCandidate(String),

    /// Embedding the query failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Reading or writing a snapshot failed.
    #[error("Snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot could not be encoded or decoded.
    #[error("Snapshot format error: {0}")]
    Format(#[from] serde_json::Error),

    /// The snapshot was written by an incompatible version.
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),
}

// =============================================================================
// Scored Document
// =============================================================================

/// A document paired with a retrieval score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument {
    pub document: EntityDocument,
    pub similarity: f64,
}

// =============================================================================
// Store
// =============================================================================

/// In-memory store of entity documents and their weighted neighbour graph.
///
/// Documents are kept in insertion order; the order fixes vector index rows
/// and therefore how equal distances are broken in search results.
pub struct DocumentGraphStore {
    docs: Vec<EntityDocument>,
    positions: HashMap<String, usize>,
    dimension: Option<usize>,
    /// `None` means dirty; rebuilt before the next search.
    index: RwLock<Option<FlatL2Index>>,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for DocumentGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentGraphStore")
            .field("documents", &self.docs.len())
            .field("dimension", &self.dimension)
            .field("embedder", &self.embedder.name())
            .finish()
    }
}

impl DocumentGraphStore {
    /// Create an empty store that embeds queries with `embedder`.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            docs: Vec::new(),
            positions: HashMap::new(),
            dimension: None,
            index: RwLock::new(None),
            embedder,
        }
    }

    /// Build a store from fully formed documents, neighbour lists included.
    pub fn from_documents<I>(embedder: Arc<dyn Embedder>, documents: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = EntityDocument>,
    {
        let mut store = Self::new(embedder);
        for mut doc in documents {
            for edge in &mut doc.neighbors {
                edge.weight = sanitize_weight(&doc.id, &edge.neighbor_id, edge.weight);
            }
            store.upsert(doc)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn get(&self, id: &str) -> Option<&EntityDocument> {
        self.positions.get(id).map(|&i| &self.docs[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// All documents in insertion order.
    pub fn documents(&self) -> impl Iterator<Item = &EntityDocument> {
        self.docs.iter()
    }

    /// All ids in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.docs.iter().map(|d| d.id.clone()).collect()
    }

    /// Whether the vector index needs a rebuild before the next search.
    pub fn is_index_stale(&self) -> bool {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Create and store a document with an empty neighbour list.
    ///
    /// An existing id is overwritten with a warning: text, metadata and
    /// embedding are replaced while the neighbour list is kept, so every edge
    /// still appears on both of its endpoints.
    pub fn add_document(
        &mut self,
        id: impl Into<String>,
        text: impl Into<String>,
        metadata: EntityMetadata,
        embedding: Vec<f64>,
    ) -> Result<&EntityDocument, StoreError> {
        let pos = self.upsert(EntityDocument::new(id, text, metadata, embedding))?;
        Ok(&self.docs[pos])
    }

    /// Add an undirected weighted edge between two stored documents.
    ///
    /// Missing endpoints make this a logged no-op. Parallel edges between the
    /// same pair are appended, never merged.
    pub fn add_edge(&mut self, id1: &str, id2: &str, edge_type: &str, weight: f64) {
        let (Some(&a), Some(&b)) = (self.positions.get(id1), self.positions.get(id2)) else {
            warn!(
                source = %id1,
                target = %id2,
                edge_type = %edge_type,
                "Skipping edge with unknown endpoint"
            );
            return;
        };
        let weight = sanitize_weight(id1, id2, weight);

        self.docs[a].neighbors.push(NeighborEdge {
            neighbor_id: id2.to_string(),
            edge_type: edge_type.to_string(),
            weight,
        });
        self.docs[b].neighbors.push(NeighborEdge {
            neighbor_id: id1.to_string(),
            edge_type: edge_type.to_string(),
            weight,
        });
    }

    fn upsert(&mut self, mut doc: EntityDocument) -> Result<usize, StoreError> {
        match self.dimension {
            Some(expected) if expected != doc.embedding.len() => {
                return Err(StoreError::DimensionMismatch {
                    id: doc.id,
                    expected,
                    got: doc.embedding.len(),
                });
            }
            Some(_) => {}
            None => self.dimension = Some(doc.embedding.len()),
        }

        self.mark_index_dirty();

        if let Some(&pos) = self.positions.get(&doc.id) {
            warn!(id = %doc.id, "Overwriting existing entity document");
            if doc.neighbors.is_empty() {
                doc.neighbors = std::mem::take(&mut self.docs[pos].neighbors);
            }
            self.docs[pos] = doc;
            return Ok(pos);
        }

        let pos = self.docs.len();
        self.positions.insert(doc.id.clone(), pos);
        self.docs.push(doc);
        Ok(pos)
    }

    fn mark_index_dirty(&mut self) {
        *self.index.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
    }

    // -------------------------------------------------------------------------
    // Vector Search
    // -------------------------------------------------------------------------

    /// Rebuild the vector index if documents were added since the last build.
    pub fn ensure_index(&self) {
        if !self.is_index_stale() {
            return;
        }
        let mut guard = self.index.write().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            let dimension = self.dimension.unwrap_or(0);
            let index =
                FlatL2Index::build(dimension, self.docs.iter().map(|d| d.embedding.as_slice()));
            debug!(
                documents = index.len(),
                dimension = dimension,
                "Rebuilt vector index"
            );
            *guard = Some(index);
        }
    }

    /// Nearest documents to an already embedded query, most similar first.
    pub fn search(&self, query_embedding: &[f64], k: usize) -> Vec<ScoredDocument> {
        if k == 0 || self.docs.is_empty() {
            return Vec::new();
        }
        if self.dimension != Some(query_embedding.len()) {
            warn!(
                expected = ?self.dimension,
                got = query_embedding.len(),
                "Query embedding dimension does not match store"
            );
            return Vec::new();
        }

        self.ensure_index();
        let guard = self.index.read().unwrap_or_else(PoisonError::into_inner);
        let Some(index) = guard.as_ref() else {
            return Vec::new();
        };

        index
            .search(query_embedding, k)
            .into_iter()
            .filter_map(|hit| {
                self.docs.get(hit.row).map(|doc| ScoredDocument {
                    document: doc.clone(),
                    similarity: distance_to_similarity(hit.distance),
                })
            })
            .collect()
    }

    /// Embed `query_text` with the injected embedder and search.
    ///
    /// An empty store returns an empty list without calling the embedder.
    pub async fn retrieve(&self, query_text: &str, k: usize) -> Result<Vec<ScoredDocument>, StoreError> {
        if k == 0 || self.docs.is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed(query_text).await?;
        Ok(self.search(&query_embedding, k))
    }

    // -------------------------------------------------------------------------
    // Adjacency
    // -------------------------------------------------------------------------

    /// Weighted adjacency over `candidate_ids` before self-loops and
    /// normalization.
    ///
    /// Direct edges between candidates are written as-is; when several edge
    /// types join the same pair the last one in the neighbour list wins.
    /// Candidates that share a neighbour outside the pool get a virtual edge
    /// `w_a * w_b / max_hops` whenever that beats the current entry.
    pub fn raw_adjacency_matrix(
        &self,
        candidate_ids: &[String],
        max_hops: usize,
    ) -> Result<Array2<f64>, StoreError> {
        let n = candidate_ids.len();
        let mut position: HashMap<&str, usize> = HashMap::with_capacity(n);
        for (i, id) in candidate_ids.iter().enumerate() {
            if position.insert(id.as_str(), i).is_some() {
                return Err(StoreError::DuplicateCandidate(id.clone()));
            }
        }

        let mut adjacency = Array2::<f64>::zeros((n, n));
        // external node -> (candidate index, edge weight) pairs pointing at it
        let mut via: HashMap<&str, Vec<(usize, f64)>> = HashMap::new();

        for (i, id) in candidate_ids.iter().enumerate() {
            let Some(doc) = self.get(id) else {
                continue;
            };
            for edge in &doc.neighbors {
                match position.get(edge.neighbor_id.as_str()) {
                    // last write wins across parallel edge types
                    Some(&j) => adjacency[[i, j]] = edge.weight,
                    None => via
                        .entry(edge.neighbor_id.as_str())
                        .or_default()
                        .push((i, edge.weight)),
                }
            }
        }

        let hops = max_hops.max(1) as f64;
        let mut virtual_edges = 0usize;
        for links in via.values().filter(|links| links.len() >= 2) {
            for (x, &(a, w_a)) in links.iter().enumerate() {
                for &(b, w_b) in &links[x + 1..] {
                    if a == b {
                        continue;
                    }
                    let weight = w_a * w_b / hops;
                    if weight > adjacency[[a, b]] {
                        adjacency[[a, b]] = weight;
                        adjacency[[b, a]] = weight;
                        virtual_edges += 1;
                    }
                }
            }
        }

        debug!(
            candidates = n,
            intermediates = via.len(),
            virtual_edges = virtual_edges,
            "Built raw adjacency"
        );
        Ok(adjacency)
    }

    /// Symmetrically normalized adjacency `D^-1/2 (A + I) D^-1/2` over the
    /// candidate pool, indexed in `candidate_ids` order.
    ///
    /// Every entry is finite. A pool whose row sums are all ~0 yields the
    /// identity.
    pub fn create_adjacency_matrix(
        &self,
        candidate_ids: &[String],
        max_hops: usize,
    ) -> Result<Array2<f64>, StoreError> {
        let mut adjacency = self.raw_adjacency_matrix(candidate_ids, max_hops)?;
        let n = adjacency.nrows();
        if n == 0 {
            return Ok(adjacency);
        }

        adjacency.diag_mut().mapv_inplace(|v| v + 1.0);

        let degrees: Vec<f64> = adjacency.rows().into_iter().map(|row| row.sum()).collect();
        if degrees.iter().all(|d| d.abs() <= DEGREE_EPSILON) {
            warn!(candidates = n, "Adjacency has no weight, using identity");
            return Ok(Array2::eye(n));
        }

        let inv_sqrt: Vec<f64> = degrees
            .iter()
            .map(|&d| {
                if d > DEGREE_EPSILON {
                    finite_or_zero(1.0 / d.sqrt())
                } else {
                    0.0
                }
            })
            .collect();

        // (a * b) == (b * a) exactly, so a symmetric input stays symmetric.
        Ok(Array2::from_shape_fn((n, n), |(i, j)| {
            finite_or_zero(adjacency[[i, j]] * (inv_sqrt[i] * inv_sqrt[j]))
        }))
    }
}

fn sanitize_weight(source: &str, target: &str, weight: f64) -> f64 {
    if weight.is_finite() && weight >= 0.0 {
        weight
    } else {
        warn!(
            source = %source,
            target = %target,
            weight = weight,
            "Clamping invalid edge weight to 0"
        );
        0.0
    }
}
