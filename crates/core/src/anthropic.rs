use crate::history::Utterance;
use crate::oracle::{DEFAULT_MAX_TOKENS, Mode, TurnOracle};
use crate::prompts::Prompts;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

pub const BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicConfig {
    base_url: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
}

pub struct AnthropicConfigBuilder {
    config: AnthropicConfig,
}

impl AnthropicConfigBuilder {
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    pub fn build(self) -> AnthropicConfig {
        self.config
    }
}

impl AnthropicConfig {
    pub fn builder(api_key: SecretString) -> AnthropicConfigBuilder {
        AnthropicConfigBuilder {
            config: Self {
                base_url: BASE_URL.to_string(),
                api_key,
                model: DEFAULT_MODEL.to_string(),
                max_tokens: DEFAULT_MAX_TOKENS,
            },
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Utterance],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    fn first_text(self) -> Option<String> {
        self.content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
    }
}

/// Calls the Anthropic Messages API directly.
pub struct AnthropicOracle {
    client: Client,
    config: AnthropicConfig,
    prompts: Prompts,
}

impl AnthropicOracle {
    pub fn new(config: AnthropicConfig, prompts: Prompts) -> Self {
        Self {
            client: Client::new(),
            config,
            prompts,
        }
    }

    /// The mode picks the GM system prompt sent with every request.
    fn request<'a>(&'a self, mode: Mode, messages: &'a [Utterance]) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: self.prompts.system(mode),
            messages,
        }
    }

    async fn send(&self, mode: Mode, messages: &[Utterance]) -> Result<String> {
        let body = self.request(mode, messages);
        tracing::debug!(
            "Sending {} messages to {} ({} mode)",
            messages.len(),
            self.config.model,
            mode
        );

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .context("Failed to reach the Anthropic API")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Anthropic API returned {status}: {detail}"));
        }

        resp.json::<MessagesResponse>()
            .await
            .context("Failed to decode Anthropic response")?
            .first_text()
            .ok_or_else(|| anyhow::anyhow!("No text content in Anthropic response"))
    }
}

#[async_trait]
impl TurnOracle for AnthropicOracle {
    async fn respond(&self, mode: Mode, messages: &[Utterance]) -> Result<String> {
        self.send(mode, messages).await
    }

    async fn open_session(&self, mode: Mode) -> Result<String> {
        let opening = [Utterance::user(self.prompts.opening(mode))];
        self.send(mode, &opening).await
    }
}
