use super::{Embedder, EmbeddingError};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Local embedding backend built on fastembed (ONNX runtime).
///
/// The model is loaded once by [`FastEmbedEmbedder::initialize`]. Inference
/// runs on the blocking pool; the model is moved into the worker and put back
/// afterwards so the async lock is never held across a blocking call.
pub struct FastEmbedEmbedder {
    model: Arc<Mutex<Option<TextEmbedding>>>,
    model_name: String,
}

impl std::fmt::Debug for FastEmbedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedEmbedder")
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl FastEmbedEmbedder {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model: Arc::new(Mutex::new(None)),
            model_name: model_name.into(),
        }
    }

    /// Map a configured model name onto a fastembed model.
    fn resolve_model(name: &str) -> EmbeddingModel {
        match name.to_lowercase().as_str() {
            "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
            "nomic-embed-text-v1.5" => EmbeddingModel::NomicEmbedTextV15,
            _ => EmbeddingModel::BGESmallENV15,
        }
    }

    pub async fn initialize(&self) -> Result<(), EmbeddingError> {
        let mut model_guard = self.model.lock().await;
        if model_guard.is_none() {
            info!(
                name: "embedding.model.loading",
                model = %self.model_name,
                "Initializing fastembed model"
            );
            let mut options = InitOptions::new(Self::resolve_model(&self.model_name));
            options.show_download_progress = false;

            let model =
                TextEmbedding::try_new(options).map_err(|e| EmbeddingError::Model(e.to_string()))?;
            *model_guard = Some(model);
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for FastEmbedEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();

        let mut model_guard = self.model.lock().await;
        let mut owned_model = model_guard.take().ok_or(EmbeddingError::NotInitialized)?;

        let (embeddings_res, returned_model) = tokio::task::spawn_blocking(move || {
            let res = owned_model.embed(texts, None);
            (res, owned_model)
        })
        .await
        .map_err(|e| EmbeddingError::Task(e.to_string()))?;

        *model_guard = Some(returned_model);
        drop(model_guard);

        let embeddings = embeddings_res.map_err(|e| EmbeddingError::Model(e.to_string()))?;
        if embeddings.len() != expected {
            return Err(EmbeddingError::MissingOutput {
                expected,
                got: embeddings.len(),
            });
        }

        Ok(embeddings
            .into_iter()
            .map(|v| v.into_iter().map(f64::from).collect())
            .collect())
    }

    fn name(&self) -> &'static str {
        "fastembed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embed_before_initialize_fails() {
        let embedder = FastEmbedEmbedder::new("bge-small-en-v1.5");
        let err = embedder.embed("query").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::NotInitialized));
    }

    #[tokio::test]
    async fn test_empty_batch_needs_no_model() {
        let embedder = FastEmbedEmbedder::new("bge-small-en-v1.5");
        let out = embedder.embed_batch(Vec::new()).await.unwrap();
        assert!(out.is_empty());
    }
}
