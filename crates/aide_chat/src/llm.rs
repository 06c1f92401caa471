//! LLM adapter for chat completions.
//!
//! Supports OpenAI (and OpenAI-compatible endpoints) and Anthropic. The
//! provider comes from the `[llm]` config section, or is detected from the
//! API keys present in the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{LlmSettings, MODEL_ENV};
use crate::error::{ChatError, ChatResult};
use crate::types::{Message, MessageRole};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

/// LLM provider type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
}

impl LlmProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(Self::OpenAI),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }

    fn key_env(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-5-mini",
            Self::Anthropic => "claude-sonnet-4.5",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAI => OPENAI_BASE_URL,
            Self::Anthropic => ANTHROPIC_BASE_URL,
        }
    }
}

/// Shape the model is asked to answer in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// A single JSON object. Enforced by OpenAI; Anthropic relies on the prompt.
    JsonObject,
}

/// LLM adapter that handles API calls
#[derive(Clone)]
pub struct LlmAdapter {
    provider: LlmProvider,
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

/// Response from LLM including usage info
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model: String,
}

impl LlmAdapter {
    /// Create a new LLM adapter with explicit configuration
    pub fn new(provider: LlmProvider, api_key: String, model: Option<String>) -> Self {
        Self {
            model: model.unwrap_or_else(|| provider.default_model().to_string()),
            base_url: provider.default_base_url().to_string(),
            provider,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Create an LLM adapter from environment variables
    ///
    /// Checks in order:
    /// 1. OPENAI_API_KEY
    /// 2. ANTHROPIC_API_KEY
    pub fn from_env() -> ChatResult<Self> {
        Self::from_config(&LlmSettings::default())
    }

    /// Create an LLM adapter from the `[llm]` config section.
    ///
    /// Keys from the environment win over `api_key`; `AIDE_LLM_MODEL` wins over
    /// `chat_model`.
    pub fn from_config(settings: &LlmSettings) -> ChatResult<Self> {
        Self::detect(settings, |name| std::env::var(name).ok())
    }

    fn detect(settings: &LlmSettings, env: impl Fn(&str) -> Option<String>) -> ChatResult<Self> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let provider = match settings.provider.as_deref() {
            Some(name) => LlmProvider::parse(name)
                .ok_or_else(|| ChatError::Config(format!("unknown llm provider: {}", name)))?,
            None => [LlmProvider::OpenAI, LlmProvider::Anthropic]
                .into_iter()
                .find(|p| non_empty(env(p.key_env())).is_some())
                .ok_or(ChatError::LlmNotConfigured)?,
        };

        let api_key = non_empty(env(provider.key_env()))
            .or_else(|| non_empty(settings.api_key.clone()))
            .ok_or(ChatError::LlmNotConfigured)?;
        let model = non_empty(env(MODEL_ENV)).or_else(|| non_empty(settings.chat_model.clone()));

        let mut adapter = Self::new(provider, api_key, model);
        if let Some(base_url) = non_empty(settings.base_url.clone()) {
            adapter.base_url = base_url.trim_end_matches('/').to_string();
        }
        debug!(
            "LLM adapter configured: {:?} {} at {}",
            adapter.provider, adapter.model, adapter.base_url
        );
        Ok(adapter)
    }

    /// Same connection, different model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Get the current provider
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Get the current model
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Complete a conversation with the LLM
    pub async fn complete(&self, messages: &[Message], format: ResponseFormat) -> ChatResult<LlmResponse> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_openai(messages, format).await,
            LlmProvider::Anthropic => self.complete_anthropic(messages).await,
        }
    }

    // OpenAI chat completion
    async fn complete_openai(&self, messages: &[Message], format: ResponseFormat) -> ChatResult<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_completion_tokens: Some(MAX_TOKENS),
            response_format: (format == ResponseFormat::JsonObject).then(|| OpenAIResponseFormat {
                kind: "json_object".to_string(),
            }),
        };

        let response = self
            .send_with_retry("OpenAI", || {
                self.client
                    .post(&url)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .header("Content-Type", "application/json")
                    .json(&request)
            })
            .await?;

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Llm(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ChatError::InvalidResponse("No response from OpenAI".to_string()))?;
        let (input_tokens, output_tokens) = result
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(LlmResponse {
            content,
            input_tokens,
            output_tokens,
            model: self.model.clone(),
        })
    }

    // Anthropic messages API
    async fn complete_anthropic(&self, messages: &[Message]) -> ChatResult<LlmResponse> {
        let url = format!("{}/messages", self.base_url);
        let request = anthropic_request(&self.model, messages);

        let response = self
            .send_with_retry("Anthropic", || {
                self.client
                    .post(&url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .header("Content-Type", "application/json")
                    .json(&request)
            })
            .await?;

        let result: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Llm(format!("Failed to parse response: {}", e)))?;

        let content = result
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| ChatError::InvalidResponse("No response from Anthropic".to_string()))?;
        let (input_tokens, output_tokens) = result
            .usage
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or((0, 0));

        Ok(LlmResponse {
            content,
            input_tokens,
            output_tokens,
            model: self.model.clone(),
        })
    }

    /// Send a request, retrying network errors, 5xx and 429 with exponential
    /// backoff (2s, then 4s)
    async fn send_with_retry<F>(&self, api: &str, build: F) -> ChatResult<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            }

            let response = match build().send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!("{} request failed (attempt {}/{}): {}", api, attempt + 1, MAX_RETRIES, e);
                    last_error = Some(ChatError::Llm(format!("Network error: {}", e)));
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() || status.as_u16() == 429 {
                let body = response.text().await.unwrap_or_default();
                warn!("{} API returned {} (attempt {}/{})", api, status, attempt + 1, MAX_RETRIES);
                last_error = Some(ChatError::Llm(format!(
                    "{} API error {} (attempt {}/{}): {}",
                    api,
                    status,
                    attempt + 1,
                    MAX_RETRIES,
                    body
                )));
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ChatError::Llm(format!("{} API error {}: {}", api, status, body)));
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or_else(|| ChatError::Llm("Max retries exceeded".to_string())))
    }
}

impl std::fmt::Debug for LlmAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAdapter")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Anthropic takes system turns as a separate field
fn anthropic_request(model: &str, messages: &[Message]) -> AnthropicRequest {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .collect();

    AnthropicRequest {
        model: model.to_string(),
        max_tokens: MAX_TOKENS,
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        messages: messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| WireMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect(),
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<OpenAIResponseFormat>,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_provider_detection() {
        let settings = LlmSettings::default();

        // Should fail when no keys are set
        assert!(matches!(
            LlmAdapter::detect(&settings, env_of(&[])),
            Err(ChatError::LlmNotConfigured)
        ));

        let adapter = LlmAdapter::detect(&settings, env_of(&[("OPENAI_API_KEY", "test-key")])).unwrap();
        assert_eq!(adapter.provider(), &LlmProvider::OpenAI);

        let adapter = LlmAdapter::detect(&settings, env_of(&[("ANTHROPIC_API_KEY", "test-key")])).unwrap();
        assert_eq!(adapter.provider(), &LlmProvider::Anthropic);

        // Empty keys do not count
        assert!(LlmAdapter::detect(&settings, env_of(&[("OPENAI_API_KEY", "")])).is_err());
    }

    #[test]
    fn test_explicit_provider_uses_config_key() {
        let settings = LlmSettings {
            provider: Some("anthropic".to_string()),
            api_key: Some("from-config".to_string()),
            ..LlmSettings::default()
        };
        let adapter = LlmAdapter::detect(&settings, env_of(&[("OPENAI_API_KEY", "ignored")])).unwrap();
        assert_eq!(adapter.provider(), &LlmProvider::Anthropic);
        assert_eq!(adapter.api_key, "from-config");
        assert_eq!(adapter.base_url(), ANTHROPIC_BASE_URL);

        let bogus = LlmSettings {
            provider: Some("mystery".to_string()),
            ..LlmSettings::default()
        };
        assert!(matches!(
            LlmAdapter::detect(&bogus, env_of(&[("OPENAI_API_KEY", "k")])),
            Err(ChatError::Config(_))
        ));
    }

    #[test]
    fn test_model_and_base_url_overrides() {
        let settings = LlmSettings {
            chat_model: Some("gpt-4o".to_string()),
            base_url: Some("http://localhost:8080/v1/".to_string()),
            ..LlmSettings::default()
        };
        let adapter = LlmAdapter::detect(&settings, env_of(&[("OPENAI_API_KEY", "k")])).unwrap();
        assert_eq!(adapter.model(), "gpt-4o");
        assert_eq!(adapter.base_url(), "http://localhost:8080/v1");

        let adapter = LlmAdapter::detect(
            &settings,
            env_of(&[("OPENAI_API_KEY", "k"), (MODEL_ENV, "gpt-4.1")]),
        )
        .unwrap();
        assert_eq!(adapter.model(), "gpt-4.1");
    }

    #[test]
    fn test_default_models() {
        let openai = LlmAdapter::new(LlmProvider::OpenAI, "key".to_string(), None);
        assert_eq!(openai.model(), "gpt-5-mini");
        assert_eq!(openai.base_url(), OPENAI_BASE_URL);

        let anthropic = LlmAdapter::new(LlmProvider::Anthropic, "key".to_string(), None);
        assert_eq!(anthropic.model(), "claude-sonnet-4.5");
    }

    #[test]
    fn test_custom_model() {
        let adapter = LlmAdapter::new(
            LlmProvider::OpenAI,
            "key".to_string(),
            Some("gpt-3.5-turbo".to_string()),
        );
        assert_eq!(adapter.model(), "gpt-3.5-turbo");
        assert_eq!(adapter.with_model("gpt-4o-mini").model(), "gpt-4o-mini");
    }

    #[test]
    fn test_anthropic_request_splits_system() {
        let messages = vec![
            Message::system("persona"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::system("extra"),
        ];
        let request = anthropic_request("claude", &messages);
        assert_eq!(request.system.as_deref(), Some("persona\n\nextra"));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "user");
        assert_eq!(request.messages[1].role, "assistant");

        let request = anthropic_request("claude", &[Message::user("hi")]);
        assert!(request.system.is_none());
    }

    #[test]
    fn test_openai_request_json_mode() {
        let request = OpenAIRequest {
            model: "m".to_string(),
            messages: Vec::new(),
            max_completion_tokens: None,
            response_format: Some(OpenAIResponseFormat {
                kind: "json_object".to_string(),
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert!(json.get("max_completion_tokens").is_none());
    }
}
