//! Embedding boundary.
//!
//! The graph store never owns an embedding model. It is handed an
//! [`Embedder`] and only calls it to embed query text; entity embeddings are
//! computed once at ingestion time and stored with each document.

pub mod local;

pub use local::FastEmbedEmbedder;

use async_trait::async_trait;

/// Errors raised by an embedding backend.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// The model has not been loaded yet.
    #[error("Embedding model not initialized")]
    NotInitialized,

    /// The backend failed to produce an embedding.
    #[error("Embedding model error: {0}")]
    Model(String),

    /// The backend returned fewer embeddings than inputs.
    #[error("Embedding backend returned {got} vectors for {expected} inputs")]
    MissingOutput { expected: usize, got: usize },

    /// The blocking worker running inference panicked or was cancelled.
    #[error("Embedding task failed: {0}")]
    Task(String),
}

/// Text embedding capability injected into the graph store.
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbeddingError> {
        let out = self.embed_batch(vec![text.to_string()]).await?;
        let got = out.len();
        out.into_iter()
            .next()
            .ok_or(EmbeddingError::MissingOutput { expected: 1, got })
    }

    /// Embed several texts, preserving order.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>, EmbeddingError>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}
