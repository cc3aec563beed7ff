//! Entity document records.
//!
//! One [`EntityDocument`] backs one node of the knowledge graph: the generated
//! text for the entity, typed metadata, its precomputed embedding and the
//! weighted typed edges to its neighbours.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Metadata
// =============================================================================

/// Metadata attached to an entity document.
///
/// `label` and `entity_type` are read by convention throughout the crate.
/// Anything else produced by document generation lives in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// Human-readable label (e.g. `rdfs:label`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Entity class, usually a CIDOC-CRM class URI or local name.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Open extension map.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EntityMetadata {
    /// Create metadata with a label and a type.
    #[must_use]
    pub fn new(label: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            entity_type: Some(entity_type.into()),
            extra: BTreeMap::new(),
        }
    }
}

// =============================================================================
// Neighbor Edge
// =============================================================================

/// A weighted, typed edge from a document to one of its neighbours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborEdge {
    /// Identifier of the neighbouring entity.
    pub neighbor_id: String,
    /// Relationship type (predicate local name or URI).
    pub edge_type: String,
    /// Non-negative edge weight.
    pub weight: f64,
}

// =============================================================================
// Entity Document
// =============================================================================

/// A single entity document held by the graph store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDocument {
    /// Opaque unique identifier (the entity URI in the source graph).
    pub id: String,
    /// Generated natural-language document body.
    pub text: String,
    /// Label, type and open metadata.
    #[serde(default)]
    pub metadata: EntityMetadata,
    /// Embedding computed once at ingestion time.
    pub embedding: Vec<f64>,
    /// Neighbour edges in insertion order. Parallel edges are kept.
    #[serde(default)]
    pub neighbors: Vec<NeighborEdge>,
}

impl EntityDocument {
    /// Create a document with an empty neighbour list.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        metadata: EntityMetadata,
        embedding: Vec<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
            embedding,
            neighbors: Vec::new(),
        }
    }

    /// Label for display, falling back to the identifier.
    #[must_use]
    pub fn label(&self) -> &str {
        self.metadata.label.as_deref().unwrap_or(&self.id)
    }

    /// Entity type for display, falling back to `"Unknown"`.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        self.metadata.entity_type.as_deref().unwrap_or("Unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_and_type_fallbacks() {
        let doc = EntityDocument::new(
            "http://example.org/e1",
            "text",
            EntityMetadata::default(),
            vec![0.0],
        );
        assert_eq!(doc.label(), "http://example.org/e1");
        assert_eq!(doc.entity_type(), "Unknown");
    }

    #[test]
    fn test_metadata_extra_fields_flatten() {
        let raw = serde_json::json!({
            "label": "Parthenon",
            "type": "E22_Human-Made_Object",
            "wikidata": "Q10288"
        });
        let meta: EntityMetadata = serde_json::from_value(raw).unwrap();
        assert_eq!(meta.label.as_deref(), Some("Parthenon"));
        assert_eq!(meta.entity_type.as_deref(), Some("E22_Human-Made_Object"));
        assert_eq!(meta.extra.get("wikidata"), Some(&serde_json::json!("Q10288")));
    }
}
