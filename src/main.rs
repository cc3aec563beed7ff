//! CIDOC-CRM Graph RAG Server
//!
//! Entry point for the knowledge graph question-answering service.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use cidoc_graph_rag::{config, server, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before anything reads the environment
    let _ = dotenvy::dotenv();

    telemetry::init();

    let config = Arc::new(config::AppConfig::load().context("Failed to load configuration")?);
    info!(
        name: "config.loaded",
        port = config.server.port,
        snapshot = ?config.store.snapshot_path,
        reweighting = ?config.reweighting.mode,
        "Configuration loaded"
    );

    let settings = config::load_llm_settings().context("Invalid LLM configuration")?;

    server::start_server(config, settings).await
}
