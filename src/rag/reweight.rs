//! Candidate pool reweighting stages.
//!
//! A stage takes the vector-ranked pool and returns it re-ordered. Stages are
//! independent and swappable; a stage whose dependency fails logs the failure
//! and hands the pool back unchanged, so retrieval never aborts here.

use crate::graph::normalize::{finite_or_zero, normalize};
use crate::graph::{DocumentGraphStore, RelationshipScorer, ScoredDocument};
use async_trait::async_trait;
use std::cmp::Ordering;
use tracing::debug;

/// Share of the combined score that comes from vector rank.
pub const VECTOR_RANK_WEIGHT: f64 = 0.6;
/// Share of the combined score that comes from the graph signal.
pub const GRAPH_SIGNAL_WEIGHT: f64 = 0.4;

/// A re-ranking stage applied to the candidate pool before subgraph
/// selection.
#[async_trait]
pub trait PoolReweighter: Send + Sync + std::fmt::Debug {
    /// Re-order `pool`. Must return the same documents it was given.
    async fn reweight(
        &self,
        store: &DocumentGraphStore,
        query: &str,
        pool: Vec<ScoredDocument>,
    ) -> Vec<ScoredDocument>;

    fn name(&self) -> &'static str;
}

/// Rank-based score `(n - i) / n` for every position of an `n`-element list.
pub fn rank_scores(n: usize) -> Vec<f64> {
    (0..n).map(|i| (n - i) as f64 / n as f64).collect()
}

/// Re-sort `pool` by `VECTOR_RANK_WEIGHT * rank + GRAPH_SIGNAL_WEIGHT * signal`.
///
/// `graph_signal[i]` belongs to `pool[i]`. The sort is stable, so equal
/// combined scores keep vector order.
pub fn combine_with_rank(pool: Vec<ScoredDocument>, graph_signal: &[f64]) -> Vec<ScoredDocument> {
    let ranks = rank_scores(pool.len());
    let mut scored: Vec<(f64, ScoredDocument)> = pool
        .into_iter()
        .enumerate()
        .map(|(i, doc)| {
            let signal = finite_or_zero(graph_signal.get(i).copied().unwrap_or(0.0));
            (VECTOR_RANK_WEIGHT * ranks[i] + GRAPH_SIGNAL_WEIGHT * signal, doc)
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(_, doc)| doc).collect()
}

// =============================================================================
// PageRank Reweighter
// =============================================================================

/// Reweights the pool with personalized PageRank over the full graph, seeded
/// by the pool's top-ranked entities.
#[derive(Debug, Clone)]
pub struct PageRankReweighter {
    scorer: RelationshipScorer,
    seed_count: usize,
}

impl PageRankReweighter {
    pub fn new(scorer: RelationshipScorer, seed_count: usize) -> Self {
        Self {
            scorer,
            seed_count: seed_count.max(1),
        }
    }
}

#[async_trait]
impl PoolReweighter for PageRankReweighter {
    async fn reweight(
        &self,
        store: &DocumentGraphStore,
        _query: &str,
        pool: Vec<ScoredDocument>,
    ) -> Vec<ScoredDocument> {
        if pool.len() < 2 {
            return pool;
        }

        let seeds: Vec<String> = pool
            .iter()
            .take(self.seed_count)
            .map(|d| d.document.id.clone())
            .collect();
        let scores = self.scorer.score(store, &store.ids(), &seeds);

        let raw: Vec<f64> = pool
            .iter()
            .map(|d| scores.get(&d.document.id).copied().unwrap_or(0.0))
            .collect();
        let signal = normalize(&raw);

        debug!(pool = pool.len(), seeds = seeds.len(), "PageRank reweighting applied");
        combine_with_rank(pool, &signal)
    }

    fn name(&self) -> &'static str {
        "pagerank"
    }
}
