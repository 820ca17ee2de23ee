use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;

pub const BASE_URL: &str = "wss://api.deepgram.com/v1/listen";
pub const AUTHORIZATION_HEADER: &str = "Authorization";

pub struct Config {
    base_url: String,
    api_key: SecretString,
    sample_rate: u32,
    channels: u16,
    interim_results: bool,
    punctuate: bool,
    utterance_end_ms: u32,
    endpointing_ms: u32,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Config {
    /// Defaults to 16 kHz mono linear16 with interim results on.
    pub fn builder(api_key: SecretString) -> ConfigBuilder {
        ConfigBuilder {
            config: Config {
                base_url: BASE_URL.to_string(),
                api_key,
                sample_rate: 16_000,
                channels: 1,
                interim_results: true,
                punctuate: true,
                utterance_end_ms: 1500,
                endpointing_ms: 500,
            },
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn url(&self) -> String {
        format!(
            "{}?encoding=linear16&sample_rate={}&channels={}&punctuate={}&interim_results={}&utterance_end_ms={}&endpointing={}",
            self.base_url,
            self.sample_rate,
            self.channels,
            self.punctuate,
            self.interim_results,
            self.utterance_end_ms,
            self.endpointing_ms,
        )
    }
}

pub(crate) fn build_request(config: &Config) -> Result<Request> {
    let mut request = config
        .url()
        .into_client_request()
        .context("Invalid recognition URL")?;
    let token = HeaderValue::from_str(&format!("Token {}", config.api_key.expose_secret()))
        .context("API key is not a valid header value")?;
    request.headers_mut().insert(AUTHORIZATION_HEADER, token);
    Ok(request)
}
