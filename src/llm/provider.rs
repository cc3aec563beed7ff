//! Provider-specific URL shapes and authentication.
//!
//! All supported providers speak the Chat Completions wire format; they
//! differ in where the endpoint lives and how the key is sent.

/// Default Azure `OpenAI` API version.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

/// Supported LLM providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// Azure `OpenAI` Service
    AzureOpenAI {
        /// Deployment name (required for Azure)
        deployment_name: String,
        /// API version (e.g., "2024-08-01-preview")
        api_version: String,
    },
    /// `OpenRouter` (openrouter.ai)
    OpenRouter,
    /// Groq (groq.com)
    Groq,
    /// Local Ollama server (port 11434)
    Ollama,
    /// Generic OpenAI-compatible provider
    Generic,
}

/// How the API key is attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `api-key: <key>` (Azure)
    ApiKeyHeader,
}

impl Provider {
    /// Detect provider from base URL.
    ///
    /// ```rust,ignore
    /// assert_eq!(Provider::detect_from_url("https://api.groq.com/openai"), Provider::Groq);
    /// ```
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("openai.azure.com") || lower.contains("azure.com") {
            Self::AzureOpenAI {
                deployment_name: String::new(),
                api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            }
        } else if lower.contains("openrouter.ai") {
            Self::OpenRouter
        } else if lower.contains("groq.com") {
            Self::Groq
        } else if lower.contains(":11434") || lower.contains("ollama") {
            Self::Ollama
        } else if lower.contains("openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Whether requests to this provider need an API key.
    #[must_use]
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama | Self::Generic)
    }

    #[must_use]
    pub fn auth_style(&self) -> AuthStyle {
        match self {
            Self::AzureOpenAI { .. } => AuthStyle::ApiKeyHeader,
            _ => AuthStyle::Bearer,
        }
    }

    /// Build the chat completions URL for this provider.
    ///
    /// A base URL that already ends in `/v1` (or `/api/v1` for `OpenRouter`)
    /// is not given a second version segment.
    #[must_use]
    pub fn build_chat_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::AzureOpenAI {
                deployment_name,
                api_version,
            } => format!(
                "{base}/openai/deployments/{deployment_name}/chat/completions?api-version={api_version}"
            ),
            Self::OpenRouter if !base.ends_with("/v1") => format!("{base}/api/v1/chat/completions"),
            _ if base.ends_with("/v1") => format!("{base}/chat/completions"),
            _ => format!("{base}/v1/chat/completions"),
        }
    }
}
