use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use cidoc_graph_rag::config::{
    AppConfig, EmbeddingConfig, ResilienceConfig, ReweightMode, ReweightingConfig, ServerConfig,
    StoreConfig,
};
use cidoc_graph_rag::embedding::{Embedder, EmbeddingError};
use cidoc_graph_rag::graph::{DocumentGraphStore, EntityMetadata, PageRankConfig, Persistable};
use cidoc_graph_rag::llm::{GenerationError, Generator};
use cidoc_graph_rag::rag::answer::{GENERATION_FAILED_MESSAGE, NO_CONTEXT_MESSAGE};
use cidoc_graph_rag::rag::{AnswerConfig, ChatAnswer, RetrieverConfig};
use cidoc_graph_rag::server::{
    HealthResponse, ReloadResponse, RetrieveResponse, build_router, build_state,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
struct OriginEmbedder;

#[async_trait]
impl Embedder for OriginEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>, EmbeddingError> {
        Ok(texts.iter().map(|_| vec![0.0]).collect())
    }

    fn name(&self) -> &'static str {
        "origin"
    }
}

#[derive(Debug)]
struct StubGenerator {
    fail: bool,
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
        if self.fail {
            Err(GenerationError::EmptyResponse)
        } else {
            Ok("The Rosetta Stone is in the British Museum.".to_string())
        }
    }

    fn model(&self) -> &str {
        "stub"
    }
}

fn test_config(snapshot_path: Option<PathBuf>, rate_limit_enabled: bool) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            body_limit_bytes: 1024 * 1024,
        },
        resilience: ResilienceConfig {
            rate_limit_enabled,
            timeout_disabled: false,
            request_timeout_secs: 30,
            requests_per_second: 0.0,
            burst_size: 2.0,
        },
        retrieval: RetrieverConfig {
            k: 3,
            initial_pool_size: 5,
            alpha: 0.5,
            max_hops: 2,
        },
        reweighting: ReweightingConfig {
            mode: ReweightMode::None,
            seed_count: 2,
        },
        pagerank: PageRankConfig::default(),
        store: StoreConfig { snapshot_path },
        embedding: EmbeddingConfig {
            model: "bge-small-en-v1.5".to_string(),
        },
        sparql: None,
        answer: AnswerConfig::default(),
        vocabulary_path: None,
    }
}

fn museum_store() -> DocumentGraphStore {
    let mut store = DocumentGraphStore::new(Arc::new(OriginEmbedder));
    let entities = [
        ("http://example.org/rosetta", "Rosetta Stone", "E22_Human-Made_Object"),
        ("http://example.org/bust", "Bust of Ramesses II", "E22_Human-Made_Object"),
        ("http://example.org/bm", "British Museum", "E53_Place"),
        ("http://example.org/louvre", "Louvre", "E53_Place"),
        ("http://example.org/london", "London", "E53_Place"),
    ];
    for (i, (id, label, class)) in entities.iter().enumerate() {
        store
            .add_document(
                *id,
                format!("{label} is a CIDOC-CRM {class}."),
                EntityMetadata::new(*label, *class),
                vec![i as f64],
            )
            .unwrap();
    }
    store.add_edge(
        "http://example.org/rosetta",
        "http://example.org/bm",
        "P55_has_current_location",
        2.0,
    );
    store.add_edge(
        "http://example.org/bm",
        "http://example.org/london",
        "P89_falls_within",
        2.0,
    );
    store
}

fn write_snapshot(dir: &Path) -> PathBuf {
    let path = dir.join("museum.json");
    museum_store().save(&path).unwrap();
    path
}

fn server_with(config: AppConfig, generator: StubGenerator) -> TestServer {
    let state = build_state(Arc::new(config), Arc::new(generator), Arc::new(OriginEmbedder))
        .expect("Failed to build state");
    TestServer::new(build_router(state)).expect("Failed to start test server")
}

#[tokio::test]
async fn test_health_reports_document_count() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = write_snapshot(dir.path());
    let server = server_with(test_config(Some(snapshot), false), StubGenerator { fail: false });

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body: HealthResponse = response.json();
    assert_eq!(body.status, "ok");
    assert_eq!(body.documents, 5);
}

#[tokio::test]
async fn test_chat_returns_answer_and_ordered_sources() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = write_snapshot(dir.path());
    let server = server_with(test_config(Some(snapshot), false), StubGenerator { fail: false });

    let response = server
        .post("/api/chat")
        .json(&json!({"question": "Where is the Rosetta Stone?"}))
        .await;
    response.assert_status_ok();

    let body: ChatAnswer = response.json();
    assert_eq!(body.answer, "The Rosetta Stone is in the British Museum.");
    let ids: Vec<&str> = body.sources.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "http://example.org/rosetta",
            "http://example.org/bm",
            "http://example.org/london"
        ]
    );
    assert_eq!(body.sources[1].entity_label, "British Museum");
    assert_eq!(body.sources[1].entity_type, "E53_Place");
}

#[tokio::test]
async fn test_chat_rejects_empty_question() {
    let server = server_with(test_config(None, false), StubGenerator { fail: false });

    let response = server.post("/api/chat").json(&json!({"question": "   "})).await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_on_empty_store_says_nothing_found() {
    let server = server_with(test_config(None, false), StubGenerator { fail: false });

    let body: ChatAnswer = server
        .post("/api/chat")
        .json(&json!({"question": "Where is the Rosetta Stone?"}))
        .await
        .json();
    assert_eq!(body.answer, NO_CONTEXT_MESSAGE);
    assert!(body.sources.is_empty());
}

#[tokio::test]
async fn test_chat_generation_failure_is_not_an_http_error() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = write_snapshot(dir.path());
    let server = server_with(test_config(Some(snapshot), false), StubGenerator { fail: true });

    let response = server
        .post("/api/chat")
        .json(&json!({"question": "Where is the Rosetta Stone?"}))
        .await;
    response.assert_status_ok();
    let body: ChatAnswer = response.json();
    assert_eq!(body.answer, GENERATION_FAILED_MESSAGE);
    assert!(body.sources.is_empty());
}

#[tokio::test]
async fn test_retrieve_honours_request_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = write_snapshot(dir.path());
    let server = server_with(test_config(Some(snapshot), false), StubGenerator { fail: false });

    let body: RetrieveResponse = server
        .post("/api/retrieve")
        .json(&json!({"query": "museum objects", "k": 2, "alpha": 1.0}))
        .await
        .json();

    let ids: Vec<&str> = body.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["http://example.org/rosetta", "http://example.org/bust"]);
    assert_eq!(body.results[0].entity_label, "Rosetta Stone");
}

#[tokio::test]
async fn test_entity_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = write_snapshot(dir.path());
    let server = server_with(test_config(Some(snapshot), false), StubGenerator { fail: false });

    let response = server
        .get("/api/entities/http%3A%2F%2Fexample.org%2Fbm")
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["entity_label"], "British Museum");
    assert_eq!(body["neighbors"].as_array().map(Vec::len), Some(2));

    let missing = server.get("/api/entities/nowhere").await;
    missing.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reload_publishes_new_snapshot_and_keeps_old_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("museum.json");
    let server = server_with(
        test_config(Some(snapshot.clone()), false),
        StubGenerator { fail: false },
    );

    // Missing snapshot: startup is empty, reload fails and the store is kept.
    let failed = server.post("/api/store/reload").await;
    failed.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(server.get("/health").await.json::<HealthResponse>().documents, 0);

    museum_store().save(&snapshot).unwrap();
    let response = server.post("/api/store/reload").await;
    response.assert_status_ok();
    assert_eq!(response.json::<ReloadResponse>().documents, 5);
    assert_eq!(server.get("/health").await.json::<HealthResponse>().documents, 5);

    std::fs::write(&snapshot, "not json").unwrap();
    let corrupt = server.post("/api/store/reload").await;
    corrupt.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(server.get("/health").await.json::<HealthResponse>().documents, 5);
}

#[tokio::test]
async fn test_rate_limit_rejects_burst_overflow() {
    let server = server_with(test_config(None, true), StubGenerator { fail: false });

    server.get("/health").await.assert_status_ok();
    server.get("/health").await.assert_status_ok();
    server
        .get("/health")
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}
