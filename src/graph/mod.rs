//! Entity document graph.
//!
//! The store side of retrieval: documents keyed by entity id, the weighted
//! undirected neighbour graph between them, vector search over their
//! embeddings, candidate-pool adjacency construction and personalized
//! PageRank.

pub mod document;
pub mod handle;
pub mod index;
pub mod normalize;
pub mod pagerank;
pub mod persistence;
pub mod store;

pub use document::{EntityDocument, EntityMetadata, NeighborEdge};
pub use handle::StoreHandle;
pub use normalize::normalize;
pub use pagerank::{PageRankConfig, RelationshipScorer};
pub use persistence::Persistable;
pub use store::{DocumentGraphStore, ScoredDocument, StoreError};
