use crate::graph::PageRankConfig;
use crate::llm::provider::DEFAULT_AZURE_API_VERSION;
use crate::llm::{LlmSettings, Provider};
use crate::rag::{AnswerConfig, RetrieverConfig, SparqlConfig};
use anyhow::{Context, bail};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Fallback config file picked up from the working directory.
const CWD_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Store snapshot to load at startup
    #[arg(long, env = "SNAPSHOT_PATH")]
    pub snapshot: Option<PathBuf>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub resilience: ResilienceConfig,
    pub retrieval: RetrieverConfig,
    pub reweighting: ReweightingConfig,
    pub pagerank: PageRankConfig,
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sparql: Option<SparqlConfig>,
    pub answer: AnswerConfig,
    /// Optional YAML file layered over the built-in CIDOC-CRM vocabulary.
    #[serde(default)]
    pub vocabulary_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub timeout_disabled: bool,
    pub request_timeout_secs: u64,
    pub requests_per_second: f32,
    pub burst_size: f32,
}

/// Which reweighting stage runs between the initial search and selection.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReweightMode {
    None,
    PageRank,
    Cidoc,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReweightingConfig {
    pub mode: ReweightMode,
    /// Number of top pool entities used as PageRank seeds.
    pub seed_count: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        // 1. Defaults
        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.body_limit_bytes", 1024 * 1024)?
            .set_default("resilience.rate_limit_enabled", true)?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.request_timeout_secs", 30)?
            .set_default("resilience.requests_per_second", 5.0)?
            .set_default("resilience.burst_size", 10.0)?
            .set_default("retrieval.k", 10)?
            .set_default("retrieval.initial_pool_size", 30)?
            .set_default("retrieval.alpha", 0.7)?
            .set_default("retrieval.max_hops", 2)?
            .set_default("reweighting.mode", "none")?
            .set_default("reweighting.seed_count", 5)?
            .set_default("pagerank.damping", 0.85)?
            .set_default("pagerank.iterations", 20)?
            .set_default("pagerank.tolerance", 1e-6)?
            .set_default("embedding.model", "bge-small-en-v1.5")?
            .set_default("answer.context_token_budget", 3000)?;

        // 2. Config file: explicit path, else ./config.yaml when present
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if Path::new(CWD_CONFIG_FILE).exists() {
            builder = builder.add_source(File::from(Path::new(CWD_CONFIG_FILE)).required(false));
        }

        // 3. Environment (e.g. CGR_RETRIEVAL__ALPHA=0.5)
        builder = builder.add_source(
            Environment::with_prefix("CGR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their env fallbacks) win over everything else
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(snapshot) = &cli.snapshot {
            builder = builder.set_override("store.snapshot_path", snapshot.to_string_lossy().into_owned())?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }

        builder.build()?.try_deserialize()
    }
}

/// Load LLM settings from `LLM_*` and `AZURE_*` environment variables.
pub fn load_llm_settings() -> anyhow::Result<LlmSettings> {
    let base_url = required_env("LLM_BASE_URL")?;
    let model = required_env("LLM_MODEL")?;

    let api_key = std::env::var("LLM_API_KEY")
        .ok()
        .filter(|s| !s.trim().is_empty());

    let mut provider = Provider::detect_from_url(&base_url);
    if let Provider::AzureOpenAI { .. } = &provider {
        let deployment_name = required_env("AZURE_DEPLOYMENT_NAME")?;
        let api_version = std::env::var("AZURE_API_VERSION")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());
        provider = Provider::AzureOpenAI {
            deployment_name,
            api_version,
        };
    }

    let temperature = match std::env::var("LLM_TEMPERATURE") {
        Ok(raw) => Some(
            raw.parse::<f32>()
                .with_context(|| format!("LLM_TEMPERATURE is not a number: {raw}"))?,
        ),
        Err(_) => None,
    };
    let timeout_secs = match std::env::var("LLM_TIMEOUT_SECS") {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("LLM_TIMEOUT_SECS is not an integer: {raw}"))?,
        Err(_) => 60,
    };

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        provider,
        temperature,
        timeout_secs,
    })
}

fn required_env(key: &str) -> anyhow::Result<String> {
    let value = std::env::var(key).with_context(|| format!("Missing required env var: {key}"))?;
    if value.trim().is_empty() {
        bail!("{key} cannot be empty");
    }
    Ok(value)
}
