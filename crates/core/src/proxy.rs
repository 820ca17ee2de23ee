//! Client for the session HTTP API in `services/api`, plus its wire types.
//!
//! The server owns the model credentials; the client only sends history and
//! receives the GM reply. The same types are used on both ends.

use crate::history::{Role, Utterance};
use crate::oracle::{Mode, TurnOracle};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub history: Vec<Utterance>,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub message: String,
    pub role: Role,
    pub mode: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionKeyResponse {
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

/// A [`TurnOracle`] that forwards every turn to the session API server.
pub struct ProxyOracle {
    client: Client,
    base_url: String,
}

impl ProxyOracle {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetches the recognizer key the server is configured with.
    pub async fn recognition_key(&self) -> Result<SecretString> {
        let resp = self
            .client
            .get(format!("{}/api/deepgram-key", self.base_url))
            .send()
            .await
            .context("Failed to reach session API")?;
        let key: RecognitionKeyResponse = decode(resp).await?;
        Ok(SecretString::from(key.api_key))
    }

    async fn post<B: Serialize, R: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach session API at {path}"))?;
        decode(resp).await
    }
}

async fn decode<R: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<R> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .json::<R>()
            .await
            .context("Failed to decode session API response");
    }
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => Err(anyhow::anyhow!(
            "{} ({}): {}",
            err.error,
            status,
            err.details.unwrap_or_default()
        )),
        Err(_) => Err(anyhow::anyhow!("Session API returned {status}: {body}")),
    }
}

#[async_trait]
impl TurnOracle for ProxyOracle {
    async fn respond(&self, mode: Mode, messages: &[Utterance]) -> Result<String> {
        let (last, history) = messages
            .split_last()
            .ok_or_else(|| anyhow::anyhow!("Cannot send an empty conversation"))?;
        let request = ChatRequest {
            message: Some(last.content.clone()),
            history: history.to_vec(),
            mode: Some(mode.as_str().to_string()),
        };
        let reply: ChatResponse = self.post("/api/chat", &request).await?;
        Ok(reply.message)
    }

    async fn open_session(&self, mode: Mode) -> Result<String> {
        let request = StartSessionRequest {
            mode: Some(mode.as_str().to_string()),
        };
        let reply: StartSessionResponse = self.post("/api/start-session", &request).await?;
        Ok(reply.message)
    }
}
