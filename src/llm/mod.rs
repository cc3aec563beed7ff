//! Answer generation boundary.
//!
//! The [`Generator`] trait is the only thing the answer pipeline knows about
//! language models: it takes a system prompt and a user prompt and returns
//! the model's reply as plain text.
//!
//! # Generators
//!
//! - [`ChatCompletionsGenerator`]: any OpenAI-compatible Chat Completions
//!   endpoint (`OpenAI`, Azure `OpenAI`, `OpenRouter`, Groq, Ollama, ...)
//!
//! # Example
//!
//! ```rust,ignore
//! use cidoc_graph_rag::llm::{ChatCompletionsGenerator, Generator, LlmSettings, Provider};
//!
//! let settings = LlmSettings {
//!     base_url: "http://localhost:11434".to_string(),
//!     api_key: None,
//!     model: "llama3.1".to_string(),
//!     provider: Provider::Ollama,
//!     temperature: None,
//!     timeout_secs: 60,
//! };
//! let generator = ChatCompletionsGenerator::new(settings)?;
//! let reply = generator.generate("You are terse.", "Say hi").await?;
//! ```

pub mod chat_completions;
pub mod provider;

pub use chat_completions::ChatCompletionsGenerator;
pub use provider::Provider;

/// LLM connection and model settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gpt-4o-mini`, `llama3.1`).
    pub model: String,
    /// Provider type (auto-detected from `base_url` if not specified).
    pub provider: Provider,
    /// Sampling temperature; provider default when unset.
    pub temperature: Option<f32>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
}

/// A chat message in `OpenAI` wire format.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Errors raised while generating an answer.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response had no message content")]
    EmptyResponse,

    #[error("LLM provider misconfigured: {0}")]
    Configuration(String),
}

/// Produces a natural-language answer from prompts.
#[async_trait::async_trait]
pub trait Generator: Send + Sync + std::fmt::Debug {
    /// Generate a reply to `user_prompt` under `system_prompt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the reply has no content.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GenerationError>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}
