//! CIDOC-CRM vocabulary: class/property labels and relationship weights.
//!
//! Built once (from the built-in table or a YAML file) and passed by `Arc`
//! to whatever needs it. Nothing here is global or mutated after
//! construction.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Weight for predicates missing from the table.
const DEFAULT_RELATIONSHIP_WEIGHT: f64 = 0.5;

/// Relationship importance, keyed by property local name.
const BUILTIN_WEIGHTS: &[(&str, f64)] = &[
    // spatial containment and location
    ("P89_falls_within", 1.0),
    ("P89i_contains", 1.0),
    ("P55_has_current_location", 1.0),
    ("P55i_currently_holds", 1.0),
    ("P53_has_former_or_current_location", 0.9),
    ("P53i_is_former_or_current_location_of", 0.9),
    ("P7_took_place_at", 0.9),
    ("P7i_witnessed", 0.9),
    ("P156_occupies", 0.85),
    // composition and production
    ("P46_is_composed_of", 0.8),
    ("P46i_forms_part_of", 0.8),
    ("P106_is_composed_of", 0.8),
    ("P106i_forms_part_of", 0.8),
    ("P108_has_produced", 0.8),
    ("P108i_was_produced_by", 0.8),
    // actors and participation
    ("P14_carried_out_by", 0.8),
    ("P14i_performed", 0.8),
    ("P11_had_participant", 0.75),
    ("P11i_participated_in", 0.75),
    ("P107_has_current_or_former_member", 0.7),
    ("P107i_is_current_or_former_member_of", 0.7),
    // reference and time
    ("P67_refers_to", 0.6),
    ("P67i_is_referred_to_by", 0.6),
    ("P4_has_time-span", 0.6),
    ("P4i_is_time-span_of", 0.6),
    ("P1_is_identified_by", 0.4),
    ("P1i_identifies", 0.4),
    // classification
    ("P2_has_type", 0.2),
    ("P2i_is_type_of", 0.2),
];

const BUILTIN_CLASS_LABELS: &[(&str, &str)] = &[
    ("E5_Event", "Event"),
    ("E7_Activity", "Activity"),
    ("E12_Production", "Production"),
    ("E18_Physical_Thing", "Physical Thing"),
    ("E21_Person", "Person"),
    ("E22_Human-Made_Object", "Human-Made Object"),
    ("E39_Actor", "Actor"),
    ("E52_Time-Span", "Time-Span"),
    ("E53_Place", "Place"),
    ("E55_Type", "Type"),
    ("E73_Information_Object", "Information Object"),
    ("E74_Group", "Group"),
];

/// Errors raised while loading a vocabulary file.
#[derive(Debug, thiserror::Error)]
pub enum VocabularyError {
    #[error("Failed to read vocabulary file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid vocabulary file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Immutable label and weight tables for CIDOC-CRM classes and properties.
#[derive(Debug, Clone, Deserialize)]
pub struct CidocVocabulary {
    #[serde(default)]
    class_labels: HashMap<String, String>,
    #[serde(default)]
    property_labels: HashMap<String, String>,
    #[serde(default)]
    relationship_weights: HashMap<String, f64>,
    #[serde(default = "default_relationship_weight")]
    default_relationship_weight: f64,
}

fn default_relationship_weight() -> f64 {
    DEFAULT_RELATIONSHIP_WEIGHT
}

impl Default for CidocVocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CidocVocabulary {
    /// The built-in CIDOC-CRM tables.
    pub fn builtin() -> Self {
        Self {
            class_labels: BUILTIN_CLASS_LABELS
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            property_labels: BUILTIN_WEIGHTS
                .iter()
                .map(|(k, _)| ((*k).to_string(), humanize_property(k)))
                .collect(),
            relationship_weights: BUILTIN_WEIGHTS
                .iter()
                .map(|(k, w)| ((*k).to_string(), *w))
                .collect(),
            default_relationship_weight: DEFAULT_RELATIONSHIP_WEIGHT,
        }
    }

    /// Load tables from YAML. Entries in the file are layered on top of the
    /// built-in tables.
    pub fn from_yaml_file(path: &Path) -> Result<Self, VocabularyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, VocabularyError> {
        let overrides: Self = serde_yaml::from_str(raw)?;
        let mut vocab = Self::builtin();
        vocab.class_labels.extend(overrides.class_labels);
        vocab.property_labels.extend(overrides.property_labels);
        vocab.relationship_weights.extend(overrides.relationship_weights);
        vocab.default_relationship_weight = overrides.default_relationship_weight;
        Ok(vocab)
    }

    /// Importance weight of a predicate, given as a URI or local name.
    pub fn relationship_weight(&self, predicate: &str) -> f64 {
        self.relationship_weights
            .get(predicate)
            .or_else(|| self.relationship_weights.get(local_name(predicate)))
            .copied()
            .unwrap_or(self.default_relationship_weight)
    }

    /// Readable label for a class URI or local name, if known.
    pub fn class_label(&self, class: &str) -> Option<&str> {
        self.class_labels
            .get(class)
            .or_else(|| self.class_labels.get(local_name(class)))
            .map(String::as_str)
    }

    /// Readable label for a property URI or local name, if known.
    pub fn property_label(&self, property: &str) -> Option<&str> {
        self.property_labels
            .get(property)
            .or_else(|| self.property_labels.get(local_name(property)))
            .map(String::as_str)
    }
}

/// Last segment of a URI after `#` or `/`.
pub fn local_name(uri: &str) -> &str {
    uri.rsplit(['#', '/']).next().unwrap_or(uri)
}

/// `P7_took_place_at` -> `took place at`.
fn humanize_property(local: &str) -> String {
    local
        .split_once('_')
        .map_or(local, |(_, rest)| rest)
        .replace('_', " ")
}
