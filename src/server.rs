use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use tower_http::trace::TraceLayer;

use tracing::{error, info, warn};

use crate::AppState;
use crate::config::{AppConfig, ReweightMode};
use crate::embedding::{Embedder, FastEmbedEmbedder};
use crate::graph::{
    DocumentGraphStore, EntityDocument, NeighborEdge, Persistable, RelationshipScorer, StoreHandle,
};
use crate::llm::{ChatCompletionsGenerator, Generator, LlmSettings};
use crate::rag::{
    AnswerAssembler, ChatAnswer, CidocReweighter, CidocVocabulary, PageRankReweighter,
    PoolReweighter, SparqlRelationshipSource,
};
use crate::security::rate_limit::{SimpleRateLimiter, rate_limit_middleware};

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>, settings: LlmSettings) -> anyhow::Result<()> {
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        provider = ?settings.provider,
        "LLM configuration loaded"
    );
    let generator: Arc<dyn Generator> = Arc::new(ChatCompletionsGenerator::new(settings)?);

    let embedder = FastEmbedEmbedder::new(config.embedding.model.clone());
    // Load eagerly so the first query does not pay for the model download.
    if let Err(e) = embedder.initialize().await {
        error!(error = %e, "Failed to initialize embedding model");
    }
    let embedder: Arc<dyn Embedder> = Arc::new(embedder);

    let state = build_state(Arc::clone(&config), generator, embedder)?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Assemble shared state: vocabulary, initial store, reweighting stages and
/// answer assembly.
pub fn build_state(
    config: Arc<AppConfig>,
    generator: Arc<dyn Generator>,
    embedder: Arc<dyn Embedder>,
) -> anyhow::Result<AppState> {
    let vocabulary = Arc::new(match &config.vocabulary_path {
        Some(path) => {
            let vocab = CidocVocabulary::from_yaml_file(path)?;
            info!(name: "vocabulary.loaded", path = %path.display(), "CIDOC vocabulary loaded");
            vocab
        }
        None => CidocVocabulary::builtin(),
    });

    let store = load_initial_store(&config, embedder)?;

    let reweighters: Vec<Arc<dyn PoolReweighter>> = match config.reweighting.mode {
        ReweightMode::None => Vec::new(),
        ReweightMode::PageRank => {
            let stage: Arc<dyn PoolReweighter> = Arc::new(PageRankReweighter::new(
                RelationshipScorer::with_config(config.pagerank),
                config.reweighting.seed_count,
            ));
            vec![stage]
        }
        ReweightMode::Cidoc => {
            let Some(sparql) = &config.sparql else {
                anyhow::bail!("reweighting.mode = cidoc requires a sparql section");
            };
            let source = Arc::new(SparqlRelationshipSource::new(sparql)?);
            let stage: Arc<dyn PoolReweighter> =
                Arc::new(CidocReweighter::new(source, Arc::clone(&vocabulary)));
            vec![stage]
        }
    };
    info!(
        name: "retrieval.configured",
        reweighting = ?config.reweighting.mode,
        k = config.retrieval.k,
        pool = config.retrieval.initial_pool_size,
        alpha = config.retrieval.alpha,
        "Retrieval pipeline configured"
    );

    let answers = Arc::new(AnswerAssembler::new(
        generator,
        vocabulary,
        config.answer.clone(),
    ));

    let rate_limiter = Arc::new(SimpleRateLimiter::new(
        config.resilience.requests_per_second,
        config.resilience.burst_size,
    ));

    Ok(AppState {
        store: StoreHandle::new(store),
        reweighters,
        answers,
        rate_limiter,
        config,
    })
}

fn load_initial_store(
    config: &AppConfig,
    embedder: Arc<dyn Embedder>,
) -> anyhow::Result<DocumentGraphStore> {
    match &config.store.snapshot_path {
        Some(path) if path.exists() => Ok(DocumentGraphStore::load(path, embedder)?),
        Some(path) => {
            warn!(path = %path.display(), "Snapshot not found, starting with an empty store");
            Ok(DocumentGraphStore::new(embedder))
        }
        None => {
            warn!("No snapshot configured, starting with an empty store");
            Ok(DocumentGraphStore::new(embedder))
        }
    }
}

/// Build the HTTP router with all layers applied.
pub fn build_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    // A disabled timeout becomes a very long one so the layer stack keeps one type.
    let timeout_duration = if config.resilience.timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60)
    } else {
        Duration::from_secs(config.resilience.request_timeout_secs)
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(api_chat))
        .route("/api/retrieve", post(api_retrieve))
        .route("/api/entities/{*id}", get(api_get_entity))
        .route("/api/store/reload", post(api_reload_store))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(config.server.body_limit_bytes))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout_duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub documents: usize,
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        documents: state.store.current().len(),
    })
}

/// Request body for chat API.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

/// POST /api/chat - Answer a question from the knowledge graph.
async fn api_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatAnswer>, (StatusCode, String)> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "question must not be empty".to_string()));
    }
    info!(question = %question, "Received chat request");

    let answer = state.answers.answer(&state.retriever(), question).await;
    Ok(Json(answer))
}

/// Request body for retrieval API. Unset fields use the configured values.
#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub initial_pool_size: Option<usize>,
    #[serde(default)]
    pub alpha: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetrievedEntity {
    pub id: String,
    pub entity_label: String,
    pub entity_type: String,
    pub text: String,
}

impl From<EntityDocument> for RetrievedEntity {
    fn from(doc: EntityDocument) -> Self {
        Self {
            entity_label: doc.label().to_string(),
            entity_type: doc.entity_type().to_string(),
            id: doc.id,
            text: doc.text,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub results: Vec<RetrievedEntity>,
}

/// POST /api/retrieve - Coherent subgraph for a query, in selection order.
async fn api_retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, (StatusCode, String)> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".to_string()));
    }

    let retriever = state.retriever();
    let defaults = retriever.config();
    let docs = retriever
        .retrieve(
            query,
            req.k.unwrap_or(defaults.k),
            req.initial_pool_size.unwrap_or(defaults.initial_pool_size),
            req.alpha.unwrap_or(defaults.alpha),
        )
        .await;

    Ok(Json(RetrieveResponse {
        results: docs.into_iter().map(RetrievedEntity::from).collect(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntityResponse {
    pub id: String,
    pub entity_label: String,
    pub entity_type: String,
    pub text: String,
    pub metadata: serde_json::Value,
    pub neighbors: Vec<NeighborEdge>,
}

/// GET /api/entities/{id} - One entity with its neighbour edges.
async fn api_get_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EntityResponse>, (StatusCode, String)> {
    let store = state.store.current();
    let doc = store
        .get(&id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Entity not found: {id}")))?;

    let metadata = serde_json::to_value(&doc.metadata)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(EntityResponse {
        id: doc.id.clone(),
        entity_label: doc.label().to_string(),
        entity_type: doc.entity_type().to_string(),
        text: doc.text.clone(),
        metadata,
        neighbors: doc.neighbors.clone(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub documents: usize,
}

/// POST /api/store/reload - Reload the snapshot and publish it.
///
/// On failure the previously published store keeps serving.
async fn api_reload_store(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, (StatusCode, String)> {
    let Some(path) = state.config.store.snapshot_path.clone() else {
        return Err((StatusCode::BAD_REQUEST, "No snapshot path configured".to_string()));
    };
    let embedder = Arc::clone(state.store.current().embedder());

    let loaded = tokio::task::spawn_blocking(move || DocumentGraphStore::load(&path, embedder))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    match loaded {
        Ok(store) => {
            let documents = store.len();
            state.store.publish(store);
            Ok(Json(ReloadResponse { documents }))
        }
        Err(e) => {
            error!(error = %e, "Store reload failed, keeping current store");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
