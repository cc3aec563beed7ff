//! OpenAI Chat Completions generator.
//!
//! Sends a single non-streaming request to `/v1/chat/completions` (or the
//! provider's equivalent) and returns the first choice's message content.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::provider::AuthStyle;
use super::{GenerationError, Generator, LlmSettings, Message};

/// Generator for OpenAI-compatible Chat Completions endpoints.
#[derive(Clone)]
pub struct ChatCompletionsGenerator {
    http: reqwest::Client,
    settings: LlmSettings,
    url: String,
}

impl std::fmt::Debug for ChatCompletionsGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsGenerator")
            .field("settings", &self.settings)
            .field("url", &self.url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsGenerator {
    /// Create a generator for the given settings.
    ///
    /// # Errors
    ///
    /// Fails when the provider needs a key that is missing, when an Azure
    /// deployment name is missing, or when the HTTP client cannot be built.
    pub fn new(settings: LlmSettings) -> Result<Self, GenerationError> {
        if settings.provider.requires_api_key() && settings.api_key.is_none() {
            return Err(GenerationError::Configuration(format!(
                "{:?} requires LLM_API_KEY",
                settings.provider
            )));
        }
        if matches!(
            &settings.provider,
            super::Provider::AzureOpenAI { deployment_name, .. } if deployment_name.is_empty()
        ) {
            return Err(GenerationError::Configuration(
                "Azure OpenAI requires AZURE_DEPLOYMENT_NAME".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        let url = settings.provider.build_chat_url(&settings.base_url);
        Ok(Self {
            http,
            settings,
            url,
        })
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.settings.model,
            "stream": false,
            "messages": [Message::system(system_prompt), Message::user(user_prompt)],
        });
        if let Some(t) = self.settings.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        body
    }
}

/// First non-empty message content in a Chat Completions response.
fn extract_content(resp: ChatResponse) -> Result<String, GenerationError> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(GenerationError::EmptyResponse)
}

#[async_trait::async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GenerationError> {
        let mut rb = self
            .http
            .post(&self.url)
            .json(&self.request_body(system_prompt, user_prompt));
        if let Some(k) = &self.settings.api_key {
            rb = match self.settings.provider.auth_style() {
                AuthStyle::Bearer => rb.bearer_auth(k),
                AuthStyle::ApiKeyHeader => rb.header("api-key", k),
            };
        }

        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        let content = extract_content(parsed)?;
        debug!(model = %self.settings.model, chars = content.len(), "LLM reply received");
        Ok(content)
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}
