//! CIDOC-CRM Graph RAG
//!
//! A question-answering service over a CIDOC-CRM cultural heritage knowledge
//! graph. Each entity is held as a text document with an embedding and its
//! typed, weighted neighbour edges. Questions are answered from a small,
//! mutually connected subgraph of entities rather than a plain top-k list.
//!
//! # Architecture
//!
//! - **Graph store**: entity documents, exact vector index, adjacency
//!   construction and personalized PageRank
//! - **Retrieval**: vector search pool, optional graph reweighting, greedy
//!   coherent subgraph selection
//! - **Answering**: token-budgeted prompt assembly and an OpenAI-compatible
//!   generator
//! - **Server**: Axum JSON API with tracing, timeouts and rate limiting
//!
//! # Modules
//!
//! - [`graph`]: document/graph store, index, PageRank, persistence
//! - [`embedding`]: embedding boundary and the local fastembed backend
//! - [`rag`]: retrieval, reweighting, vocabulary and answer assembly
//! - [`llm`]: generation boundary and provider handling
//! - [`server`]: HTTP routes and startup

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod embedding;
pub mod graph;
pub mod llm;
pub mod rag;
pub mod security;
pub mod server;
pub mod telemetry;

use crate::config::AppConfig;
use crate::graph::StoreHandle;
use crate::rag::{AnswerAssembler, CoherentRetriever, PoolReweighter};
use crate::security::SimpleRateLimiter;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Currently published graph store.
    pub store: StoreHandle,
    /// Reweighting stages applied before subgraph selection.
    pub reweighters: Vec<Arc<dyn PoolReweighter>>,
    /// Prompt assembly and generation.
    pub answers: Arc<AnswerAssembler>,
    /// Global Rate Limiter
    pub rate_limiter: Arc<SimpleRateLimiter>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Retriever bound to the store published right now.
    pub fn retriever(&self) -> CoherentRetriever {
        CoherentRetriever::with_config(self.store.current(), self.config.retrieval.clone())
            .with_reweighters(self.reweighters.clone())
    }
}
