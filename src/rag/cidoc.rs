//! CIDOC-CRM relationship-aware pool reweighting.
//!
//! Pulls the live relationships between pool entities from a
//! [`RelationshipSource`], weights each by the importance of its CIDOC-CRM
//! property and re-ranks the pool by weighted degree centrality.

use crate::graph::{DocumentGraphStore, ScoredDocument};
use crate::rag::reweight::{PoolReweighter, combine_with_rank};
use crate::rag::vocabulary::CidocVocabulary;
use async_trait::async_trait;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

// =============================================================================
// Relationship Source
// =============================================================================

/// A directed relationship `subject --predicate--> object`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EntityRelationship {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// Errors raised by a relationship source.
#[derive(Debug, thiserror::Error)]
pub enum RelationshipError {
    #[error("Relationship query failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Relationship endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed relationship response: {0}")]
    Malformed(String),
}

/// Source of live relationships between entities (e.g. a SPARQL endpoint).
#[async_trait]
pub trait RelationshipSource: Send + Sync + std::fmt::Debug {
    /// Directed relationships whose subject and object are both in `ids`.
    async fn relationships_among(
        &self,
        ids: &[String],
    ) -> Result<Vec<EntityRelationship>, RelationshipError>;
}

// =============================================================================
// CIDOC Reweighter
// =============================================================================

/// Re-ranks the pool by CIDOC-weighted degree centrality.
#[derive(Debug, Clone)]
pub struct CidocReweighter {
    source: Arc<dyn RelationshipSource>,
    vocabulary: Arc<CidocVocabulary>,
}

impl CidocReweighter {
    pub fn new(source: Arc<dyn RelationshipSource>, vocabulary: Arc<CidocVocabulary>) -> Self {
        Self { source, vocabulary }
    }

    /// Weighted degree (in + out) per pool entity, scaled so the most central
    /// entity scores 1.0. Entities without relationships score 0.
    pub fn centrality(&self, ids: &[String], relationships: &[EntityRelationship]) -> Vec<f64> {
        let mut graph: DiGraph<usize, f64> = DiGraph::new();
        let nodes: HashMap<&str, NodeIndex> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), graph.add_node(i)))
            .collect();

        for rel in relationships {
            if rel.subject == rel.object {
                continue;
            }
            if let (Some(&s), Some(&o)) = (
                nodes.get(rel.subject.as_str()),
                nodes.get(rel.object.as_str()),
            ) {
                graph.add_edge(s, o, self.vocabulary.relationship_weight(&rel.predicate));
            }
        }

        let degree: Vec<f64> = ids
            .iter()
            .map(|id| {
                let node = nodes[id.as_str()];
                let outgoing: f64 = graph
                    .edges_directed(node, Direction::Outgoing)
                    .map(|e| *e.weight())
                    .sum();
                let incoming: f64 = graph
                    .edges_directed(node, Direction::Incoming)
                    .map(|e| *e.weight())
                    .sum();
                outgoing + incoming
            })
            .collect();

        let max = degree.iter().copied().fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return vec![0.0; ids.len()];
        }
        degree.into_iter().map(|d| d / max).collect()
    }
}

#[async_trait]
impl PoolReweighter for CidocReweighter {
    async fn reweight(
        &self,
        _store: &DocumentGraphStore,
        _query: &str,
        pool: Vec<ScoredDocument>,
    ) -> Vec<ScoredDocument> {
        if pool.len() < 2 {
            return pool;
        }

        let ids: Vec<String> = pool.iter().map(|d| d.document.id.clone()).collect();
        let relationships = match self.source.relationships_among(&ids).await {
            Ok(rels) => rels,
            Err(e) => {
                error!(error = %e, "CIDOC relationship query failed, keeping vector ranking");
                return pool;
            }
        };

        let centrality = self.centrality(&ids, &relationships);
        debug!(
            pool = pool.len(),
            relationships = relationships.len(),
            "CIDOC reweighting applied"
        );
        combine_with_rank(pool, &centrality)
    }

    fn name(&self) -> &'static str {
        "cidoc"
    }
}
