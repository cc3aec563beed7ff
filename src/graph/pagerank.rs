//! Personalized PageRank over the full entity graph.
//!
//! Used as an alternate relevance signal: rank flows along weighted
//! neighbour edges and restarts preferentially at a seed set of
//! query-relevant entities.

use crate::graph::store::DocumentGraphStore;
use std::collections::HashMap;
use tracing::debug;

/// Parameters for the power iteration.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
pub struct PageRankConfig {
    /// Probability of following an edge rather than restarting.
    pub damping: f64,
    /// Maximum number of power iterations.
    pub iterations: usize,
    /// Stop once the L2 norm of the update drops below this.
    pub tolerance: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            iterations: 20,
            tolerance: 1e-6,
        }
    }
}

/// Scores entities with personalized PageRank.
#[derive(Debug, Clone, Default)]
pub struct RelationshipScorer {
    config: PageRankConfig,
}

impl RelationshipScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PageRankConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PageRankConfig {
        &self.config
    }

    /// Score every id in `all_ids`, biased toward `seed_ids`.
    ///
    /// The transition matrix is the row-normalized direct-edge adjacency over
    /// `all_ids` (last edge wins per pair, no virtual edges). Rows without
    /// outgoing weight teleport uniformly. Seeds outside `all_ids` are
    /// ignored.
    pub fn score(
        &self,
        store: &DocumentGraphStore,
        all_ids: &[String],
        seed_ids: &[String],
    ) -> HashMap<String, f64> {
        let n = all_ids.len();
        if n == 0 {
            return HashMap::new();
        }

        let position: HashMap<&str, usize> = all_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let transitions = build_transitions(store, all_ids, &position);
        let personalization = personalization_vector(n, seed_ids, &position);

        let damping = self.config.damping.clamp(0.0, 1.0);
        let uniform = 1.0 / n as f64;
        let mut rank = vec![uniform; n];
        let mut iterations = 0;

        for _ in 0..self.config.iterations {
            iterations += 1;

            // Mass sitting on rows with no outgoing weight is spread evenly.
            let dangling: f64 = transitions
                .iter()
                .zip(&rank)
                .filter(|(row, _)| row.is_empty())
                .map(|(_, r)| r)
                .sum();

            let mut next: Vec<f64> = personalization
                .iter()
                .map(|p| (1.0 - damping) * p + damping * dangling * uniform)
                .collect();

            for (i, row) in transitions.iter().enumerate() {
                let mass = damping * rank[i];
                for &(j, p) in row {
                    next[j] += mass * p;
                }
            }

            let delta: f64 = next
                .iter()
                .zip(&rank)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            rank = next;

            if delta < self.config.tolerance {
                break;
            }
        }

        debug!(
            entities = n,
            seeds = seed_ids.len(),
            iterations = iterations,
            "Personalized PageRank finished"
        );

        all_ids.iter().cloned().zip(rank).collect()
    }
}

/// Row-normalized sparse transition rows: `(column, probability)` pairs.
fn build_transitions(
    store: &DocumentGraphStore,
    all_ids: &[String],
    position: &HashMap<&str, usize>,
) -> Vec<Vec<(usize, f64)>> {
    all_ids
        .iter()
        .map(|id| {
            let Some(doc) = store.get(id) else {
                return Vec::new();
            };

            // last write wins per neighbour, in first-seen column order
            let mut weights: Vec<(usize, f64)> = Vec::new();
            let mut slot: HashMap<usize, usize> = HashMap::new();
            for edge in &doc.neighbors {
                let Some(&j) = position.get(edge.neighbor_id.as_str()) else {
                    continue;
                };
                match slot.get(&j) {
                    Some(&s) => weights[s].1 = edge.weight,
                    None => {
                        slot.insert(j, weights.len());
                        weights.push((j, edge.weight));
                    }
                }
            }

            let total: f64 = weights.iter().map(|(_, w)| w).sum();
            if total <= 0.0 || !total.is_finite() {
                return Vec::new();
            }
            weights
                .into_iter()
                .filter(|(_, w)| *w > 0.0)
                .map(|(j, w)| (j, w / total))
                .collect()
        })
        .collect()
}

/// Uniform `1/n` restart weights with seeds raised to `1.0`, summing to one.
fn personalization_vector(
    n: usize,
    seed_ids: &[String],
    position: &HashMap<&str, usize>,
) -> Vec<f64> {
    let mut p = vec![1.0 / n as f64; n];
    for seed in seed_ids {
        if let Some(&i) = position.get(seed.as_str()) {
            p[i] = 1.0;
        }
    }
    let total: f64 = p.iter().sum();
    p.iter_mut().for_each(|v| *v /= total);
    p
}
