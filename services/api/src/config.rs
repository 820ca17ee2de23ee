use secrecy::SecretString;
use session_zero_core::anthropic::DEFAULT_MODEL;
use session_zero_core::oracle::DEFAULT_MAX_TOKENS;
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
pub struct Config {
    pub bind_address: SocketAddr,
    pub anthropic_api_key: SecretString,
    pub deepgram_api_key: Option<SecretString>,
    pub chat_model: String,
    pub max_tokens: u32,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// This function will look for a `.env` file in the current directory
    /// and load the following variables:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:3000".
    /// *   `ANTHROPIC_API_KEY`: Your secret key for the Anthropic API. Required.
    /// *   `DEEPGRAM_API_KEY`: (Optional) Handed to clients by `/api/deepgram-key`.
    /// *   `CHAT_MODEL`: (Optional) The GM model. Defaults to `claude-sonnet-4-20250514`.
    /// *   `MAX_TOKENS`: (Optional) Reply length cap. Defaults to 1024.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .map(SecretString::from)
            .map_err(|_| ConfigError::MissingVar("ANTHROPIC_API_KEY".to_string()))?;
        let deepgram_api_key = std::env::var("DEEPGRAM_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .map(SecretString::from);

        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = match std::env::var("MAX_TOKENS") {
            Ok(raw) => raw.parse::<u32>().map_err(|e| {
                ConfigError::InvalidValue("MAX_TOKENS".to_string(), e.to_string())
            })?,
            Err(_) => DEFAULT_MAX_TOKENS,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            anthropic_api_key,
            deepgram_api_key,
            chat_model,
            max_tokens,
            log_level,
        })
    }
}
