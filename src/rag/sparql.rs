//! SPARQL-backed relationship source.
//!
//! Asks the RDF store for every triple whose subject and object are both pool
//! entities and whose object is a resource.

use crate::rag::cidoc::{EntityRelationship, RelationshipError, RelationshipSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for the SPARQL endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SparqlConfig {
    /// Query endpoint URL, e.g. `http://localhost:7200/repositories/museum`.
    pub endpoint: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

/// Relationship source querying a SPARQL 1.1 endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct SparqlRelationshipSource {
    http: reqwest::Client,
    endpoint: url::Url,
}

impl SparqlRelationshipSource {
    pub fn new(config: &SparqlConfig) -> anyhow::Result<Self> {
        let endpoint = url::Url::parse(&config.endpoint)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, endpoint })
    }

    /// Build the relationship query for a set of entity URIs.
    ///
    /// Returns `None` when fewer than two ids are usable as IRIs.
    pub fn build_query(ids: &[String]) -> Option<String> {
        let iris: Vec<String> = ids
            .iter()
            .filter(|id| is_safe_iri(id))
            .map(|id| format!("<{id}>"))
            .collect();
        if iris.len() < 2 {
            return None;
        }
        let values = iris.join(" ");
        Some(format!(
            "SELECT DISTINCT ?s ?p ?o WHERE {{\n  VALUES ?s {{ {values} }}\n  VALUES ?o {{ {values} }}\n  ?s ?p ?o .\n  FILTER(?s != ?o)\n}}"
        ))
    }
}

/// Accept absolute IRIs without characters that would break out of `<...>`.
fn is_safe_iri(id: &str) -> bool {
    url::Url::parse(id).is_ok()
        && !id
            .chars()
            .any(|c| matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' | ' '))
}

// -----------------------------------------------------------------------------
// SPARQL JSON results
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SparqlResults {
    results: SparqlBindings,
}

#[derive(Debug, Deserialize)]
struct SparqlBindings {
    bindings: Vec<HashMap<String, SparqlTerm>>,
}

#[derive(Debug, Deserialize)]
struct SparqlTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

fn parse_bindings(results: SparqlResults) -> Vec<EntityRelationship> {
    results
        .results
        .bindings
        .into_iter()
        .filter_map(|row| {
            let s = row.get("s")?;
            let p = row.get("p")?;
            let o = row.get("o")?;
            (o.kind == "uri" && s.kind == "uri").then(|| EntityRelationship {
                subject: s.value.clone(),
                predicate: p.value.clone(),
                object: o.value.clone(),
            })
        })
        .collect()
}

#[async_trait]
impl RelationshipSource for SparqlRelationshipSource {
    async fn relationships_among(
        &self,
        ids: &[String],
    ) -> Result<Vec<EntityRelationship>, RelationshipError> {
        let Some(query) = Self::build_query(ids) else {
            warn!(ids = ids.len(), "No usable IRIs for relationship query");
            return Ok(Vec::new());
        };

        let resp = self
            .http
            .post(self.endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/sparql-results+json")
            .form(&[("query", query.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelationshipError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let results: SparqlResults = resp
            .json()
            .await
            .map_err(|e| RelationshipError::Malformed(e.to_string()))?;
        let relationships = parse_bindings(results);

        debug!(
            entities = ids.len(),
            relationships = relationships.len(),
            "Fetched pool relationships"
        );
        Ok(relationships)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query_uses_values_blocks() {
        let ids = vec![
            "http://example.org/a".to_string(),
            "http://example.org/b".to_string(),
        ];
        let q = SparqlRelationshipSource::build_query(&ids).unwrap();
        assert!(q.contains("VALUES ?s { <http://example.org/a> <http://example.org/b> }"));
        assert!(q.contains("VALUES ?o { <http://example.org/a> <http://example.org/b> }"));
    }

    #[test]
    fn test_build_query_skips_unsafe_ids() {
        let ids = vec![
            "http://example.org/a".to_string(),
            "not an iri".to_string(),
            "http://example.org/b> } DROP ALL {".to_string(),
        ];
        assert!(SparqlRelationshipSource::build_query(&ids).is_none());
    }

    #[test]
    fn test_parse_bindings_keeps_resource_objects() {
        let raw = serde_json::json!({
            "head": {"vars": ["s", "p", "o"]},
            "results": {"bindings": [
                {
                    "s": {"type": "uri", "value": "http://example.org/a"},
                    "p": {"type": "uri", "value": "http://www.cidoc-crm.org/cidoc-crm/P89_falls_within"},
                    "o": {"type": "uri", "value": "http://example.org/b"}
                },
                {
                    "s": {"type": "uri", "value": "http://example.org/a"},
                    "p": {"type": "uri", "value": "http://www.w3.org/2000/01/rdf-schema#label"},
                    "o": {"type": "literal", "value": "A"}
                }
            ]}
        });
        let results: SparqlResults = serde_json::from_value(raw).unwrap();
        let rels = parse_bindings(results);

        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].object, "http://example.org/b");
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let config = SparqlConfig {
            endpoint: "not a url".to_string(),
            timeout_secs: 1,
        };
        assert!(SparqlRelationshipSource::new(&config).is_err());
    }
}
