use cidoc_graph_rag::config::{AppConfig, ReweightMode, load_llm_settings};
use cidoc_graph_rag::llm::Provider;
use serial_test::serial;
use std::env;
use std::fs;

const BIN: &str = "cidoc-graph-rag";

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        for key in [
            "CGR_SERVER__PORT",
            "CGR_RETRIEVAL__ALPHA",
            "CGR_RETRIEVAL__K",
            "CGR_REWEIGHTING__MODE",
            "CGR_SPARQL__ENDPOINT",
            "CONFIG_FILE",
            "PORT",
            "SNAPSHOT_PATH",
            "RATE_LIMIT_ENABLED",
            "TIMEOUT_DISABLED",
            "LLM_BASE_URL",
            "LLM_MODEL",
            "LLM_API_KEY",
            "LLM_TEMPERATURE",
            "AZURE_DEPLOYMENT_NAME",
            "AZURE_API_VERSION",
        ] {
            env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load default config");
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.retrieval.k, 10);
    assert_eq!(config.retrieval.initial_pool_size, 30);
    assert!((config.retrieval.alpha - 0.7).abs() < 1e-12);
    assert_eq!(config.retrieval.max_hops, 2);
    assert_eq!(config.reweighting.mode, ReweightMode::None);
    assert_eq!(config.pagerank.iterations, 20);
    assert_eq!(config.answer.context_token_budget, 3000);
    assert!(config.sparql.is_none());
    assert!(config.store.snapshot_path.is_none());
    assert!(config.resilience.rate_limit_enabled);
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("CGR_SERVER__PORT", "9090");
        env::set_var("CGR_RETRIEVAL__ALPHA", "0.5");
        env::set_var("CGR_REWEIGHTING__MODE", "pagerank");
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert!((config.retrieval.alpha - 0.5).abs() < 1e-12);
    assert_eq!(config.reweighting.mode, ReweightMode::PageRank);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_flags_win_over_env() {
    clear_env_vars();
    unsafe {
        env::set_var("CGR_SERVER__PORT", "9090");
    }

    let config = AppConfig::load_from_args([
        BIN,
        "--port",
        "8181",
        "--snapshot",
        "data/museum.json",
        "--rate-limit-enabled",
        "false",
    ])
    .expect("Failed to load config");
    assert_eq!(config.server.port, 8181);
    assert_eq!(
        config.store.snapshot_path.as_deref(),
        Some(std::path::Path::new("data/museum.json"))
    );
    assert!(!config.resilience.rate_limit_enabled);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("museum.yaml");
    fs::write(
        &file_path,
        r"
server:
  port: 7070
retrieval:
  k: 5
reweighting:
  mode: cidoc
sparql:
  endpoint: http://localhost:7200/repositories/museum
",
    )
    .expect("Failed to write temp config");

    unsafe {
        env::set_var("CONFIG_FILE", &file_path);
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.retrieval.k, 5);
    // unset keys in a partially given section keep their defaults
    assert_eq!(config.retrieval.initial_pool_size, 30);
    assert_eq!(config.reweighting.mode, ReweightMode::Cidoc);
    let sparql = config.sparql.expect("sparql section");
    assert_eq!(sparql.endpoint, "http://localhost:7200/repositories/museum");
    assert_eq!(sparql.timeout_secs, 10);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cwd_config_fallback() {
    clear_env_vars();

    let cwd_path = "config.yaml";
    fs::write(
        cwd_path,
        r"
server:
  port: 6060
",
    )
    .expect("Failed to write ./config.yaml");

    let config = AppConfig::load_from_args([BIN]);
    fs::remove_file(cwd_path).unwrap();

    assert_eq!(config.expect("Failed to load config").server.port, 6060);
}

#[test]
#[serial]
fn test_llm_settings_from_env() {
    clear_env_vars();
    unsafe {
        env::set_var("LLM_BASE_URL", "http://localhost:11434");
        env::set_var("LLM_MODEL", "llama3.1");
        env::set_var("LLM_TEMPERATURE", "0.2");
    }

    let settings = load_llm_settings().expect("Failed to load LLM settings");
    assert_eq!(settings.provider, Provider::Ollama);
    assert_eq!(settings.model, "llama3.1");
    assert!(settings.api_key.is_none());
    assert_eq!(settings.temperature, Some(0.2));

    clear_env_vars();
}

#[test]
#[serial]
fn test_llm_settings_require_model() {
    clear_env_vars();
    unsafe {
        env::set_var("LLM_BASE_URL", "https://api.openai.com");
    }

    let err = load_llm_settings().unwrap_err();
    assert!(err.to_string().contains("LLM_MODEL"));

    clear_env_vars();
}

#[test]
#[serial]
fn test_azure_needs_deployment() {
    clear_env_vars();
    unsafe {
        env::set_var("LLM_BASE_URL", "https://my-resource.openai.azure.com");
        env::set_var("LLM_MODEL", "gpt-4o");
        env::set_var("AZURE_DEPLOYMENT_NAME", "gpt-4o-prod");
    }

    let settings = load_llm_settings().expect("Failed to load LLM settings");
    assert_eq!(
        settings.provider,
        Provider::AzureOpenAI {
            deployment_name: "gpt-4o-prod".to_string(),
            api_version: "2024-08-01-preview".to_string(),
        }
    );

    clear_env_vars();
}
