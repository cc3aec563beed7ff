//! Two-stage coherent subgraph retrieval.
//!
//! Stage one pulls a candidate pool by vector similarity. Stage two picks `k`
//! documents from that pool greedily, trading each candidate's relevance
//! against how well it connects to the documents already picked. The
//! result is a small, mutually related set of entities rather than a plain
//! top-k nearest-neighbour list.
//!
//! Per query the pipeline moves through
//! `INITIAL_SEARCH -> GRAPH_REWEIGHT -> CANDIDATE_POOL_READY -> ADJACENCY_BUILT
//! -> GREEDY_SELECTION -> DONE` and keeps no state between calls.

use crate::graph::normalize::{argmax, finite_or_zero, normalize};
use crate::graph::{DocumentGraphStore, EntityDocument, ScoredDocument};
use crate::rag::reweight::{PoolReweighter, rank_scores};
use ndarray::Array2;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info};

// =============================================================================
// Configuration
// =============================================================================

/// Retrieval parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrieverConfig {
    /// Number of documents to select.
    pub k: usize,
    /// Size of the vector-search candidate pool.
    pub initial_pool_size: usize,
    /// Relevance weight in `[0, 1]`; `1 - alpha` goes to connectivity.
    pub alpha: f64,
    /// Hop divisor for virtual edges in the adjacency matrix.
    pub max_hops: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            k: 10,
            initial_pool_size: 30,
            alpha: 0.7,
            max_hops: 2,
        }
    }
}

// =============================================================================
// Retriever
// =============================================================================

/// Pipeline states, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    InitialSearch,
    GraphReweight,
    CandidatePoolReady,
    AdjacencyBuilt,
    GreedySelection,
    Done,
}

/// Coherent subgraph retriever over one published store.
#[derive(Debug, Clone)]
pub struct CoherentRetriever {
    store: Arc<DocumentGraphStore>,
    reweighters: Vec<Arc<dyn PoolReweighter>>,
    config: RetrieverConfig,
}

impl CoherentRetriever {
    pub fn new(store: Arc<DocumentGraphStore>) -> Self {
        Self::with_config(store, RetrieverConfig::default())
    }

    pub fn with_config(store: Arc<DocumentGraphStore>, config: RetrieverConfig) -> Self {
        Self {
            store,
            reweighters: Vec::new(),
            config,
        }
    }

    /// Add reweighting stages, applied in order after the initial search.
    #[must_use]
    pub fn with_reweighters(mut self, reweighters: Vec<Arc<dyn PoolReweighter>>) -> Self {
        self.reweighters = reweighters;
        self
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<DocumentGraphStore> {
        &self.store
    }

    /// Retrieve with the configured `k`, pool size and `alpha`.
    pub async fn retrieve_default(&self, query: &str) -> Vec<EntityDocument> {
        self.retrieve(
            query,
            self.config.k,
            self.config.initial_pool_size,
            self.config.alpha,
        )
        .await
    }

    /// Retrieve `k` documents forming a coherent subgraph for `query`.
    ///
    /// Never fails: an embedding failure or empty store yields an empty list,
    /// and a pool no larger than `k` is returned in similarity order as-is.
    /// The pool holds at most `initial_pool_size` documents, so a `k` above
    /// it returns the whole pool.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        initial_pool_size: usize,
        alpha: f64,
    ) -> Vec<EntityDocument> {
        log_stage(Stage::InitialSearch, query);
        let mut pool = match self.store.retrieve(query, initial_pool_size).await {
            Ok(pool) => pool,
            Err(e) => {
                error!(error = %e, "Initial vector search failed");
                return Vec::new();
            }
        };

        if pool.is_empty() {
            log_stage(Stage::Done, query);
            return Vec::new();
        }
        if pool.len() <= k {
            debug!(pool = pool.len(), k = k, "Pool not larger than k, skipping subgraph selection");
            log_stage(Stage::Done, query);
            return into_documents(pool);
        }

        if !self.reweighters.is_empty() {
            log_stage(Stage::GraphReweight, query);
            for stage in &self.reweighters {
                pool = stage.reweight(&self.store, query, pool).await;
                debug!(stage = stage.name(), "Reweighting stage finished");
            }
        }
        log_stage(Stage::CandidatePoolReady, query);

        let candidate_ids: Vec<String> = pool.iter().map(|d| d.document.id.clone()).collect();
        let adjacency = match self
            .store
            .create_adjacency_matrix(&candidate_ids, self.config.max_hops)
        {
            Ok(adjacency) => adjacency,
            Err(e) => {
                error!(error = %e, "Adjacency construction failed, ignoring connectivity");
                Array2::eye(candidate_ids.len())
            }
        };
        log_stage(Stage::AdjacencyBuilt, query);

        // Relevance is rank based: only relative order in the pool counts.
        let scores = rank_scores(pool.len());

        log_stage(Stage::GreedySelection, query);
        let selected = compute_coherent_subgraph(&into_documents(pool), &adjacency, &scores, k, alpha);

        info!(
            name: "retrieval.completed",
            selected = selected.len(),
            pool = candidate_ids.len(),
            k = k,
            alpha = alpha,
            "Coherent subgraph retrieved"
        );
        log_stage(Stage::Done, query);
        selected
    }
}

fn log_stage(stage: Stage, query: &str) {
    debug!(stage = ?stage, query = %query, "Retrieval stage");
}

fn into_documents(pool: Vec<ScoredDocument>) -> Vec<EntityDocument> {
    pool.into_iter().map(|d| d.document).collect()
}

// =============================================================================
// Greedy Selection
// =============================================================================

/// Pick up to `k` candidates balancing relevance and connectivity.
///
/// `adjacency[[i, j]]` and `scores[i]` refer to `candidates[i]`. The first
/// pick is the most relevant candidate. Every later pick maximizes
/// `alpha * relevance + (1 - alpha) * connectivity`, where connectivity is
/// the mean of `max(A[i,j], A[j,i])` over the selected `j`, min-max
/// normalized over the remaining candidates of that round. Ties go to the
/// lowest index.
pub fn compute_coherent_subgraph<T: Clone>(
    candidates: &[T],
    adjacency: &Array2<f64>,
    scores: &[f64],
    k: usize,
    alpha: f64,
) -> Vec<T> {
    select_coherent_indices(adjacency, scores, k, alpha)
        .into_iter()
        .filter_map(|i| candidates.get(i).cloned())
        .collect()
}

/// Index form of [`compute_coherent_subgraph`], in selection order.
pub fn select_coherent_indices(
    adjacency: &Array2<f64>,
    scores: &[f64],
    k: usize,
    alpha: f64,
) -> Vec<usize> {
    let n = scores.len();
    if n == 0 || k == 0 {
        return Vec::new();
    }
    let alpha = if alpha.is_finite() { alpha.clamp(0.0, 1.0) } else { 1.0 };
    let relevance = normalize(scores);

    let edge = |i: usize, j: usize| -> f64 {
        if i < adjacency.nrows() && j < adjacency.ncols() {
            finite_or_zero(adjacency[[i, j]])
        } else {
            0.0
        }
    };

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(n));
    let mut is_selected = vec![false; n];

    let Some(first) = argmax(&relevance) else {
        return selected;
    };
    selected.push(first);
    is_selected[first] = true;

    while selected.len() < k {
        let remaining: Vec<usize> = (0..n).filter(|&i| !is_selected[i]).collect();
        if remaining.is_empty() {
            break;
        }

        let connectivity: Vec<f64> = remaining
            .iter()
            .map(|&i| {
                let total: f64 = selected.iter().map(|&j| edge(i, j).max(edge(j, i))).sum();
                total / selected.len() as f64
            })
            .collect();
        let connectivity = normalize(&connectivity);

        let combined: Vec<f64> = remaining
            .iter()
            .zip(&connectivity)
            .map(|(&i, &c)| alpha * relevance[i] + (1.0 - alpha) * c)
            .collect();

        let Some(best) = argmax(&combined) else {
            break;
        };
        let pick = remaining[best];
        selected.push(pick);
        is_selected[pick] = true;
    }

    selected
}
