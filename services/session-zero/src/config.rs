//! Application Configuration Module
//!
//! Loads the client's settings from the environment (and `.env`, if present).

use secrecy::SecretString;
use session_zero_core::anthropic::DEFAULT_MODEL;
use session_zero_core::oracle::DEFAULT_MAX_TOKENS;
use session_zero_core::recorder::DRAIN_GRACE;
use std::env;
use std::time::Duration;
use tracing::Level;

/// How long a transient status stays up before "Ready" comes back.
pub const STATUS_RESTORE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleProvider {
    /// Talk to the Anthropic API directly.
    Anthropic,
    /// Go through the session API server.
    Proxy,
}

impl OracleProvider {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_lowercase().as_str() {
            "anthropic" => Ok(OracleProvider::Anthropic),
            "proxy" => Ok(OracleProvider::Proxy),
            other => Err(ConfigError::InvalidValue(
                "ORACLE_PROVIDER".to_string(),
                format!("'{}' is not one of anthropic, proxy", other),
            )),
        }
    }
}

/// Holds all configuration loaded from the environment.
#[derive(Debug)]
pub struct Config {
    pub provider: OracleProvider,
    pub anthropic_api_key: Option<SecretString>,
    pub oracle_url: String,
    pub deepgram_api_key: Option<SecretString>,
    pub chat_model: String,
    pub max_tokens: u32,
    pub audio_input_device: Option<String>,
    pub drain_grace: Duration,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

fn parse_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(name.to_string(), format!("'{}' is not a number", raw))
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `ORACLE_PROVIDER`: "anthropic" or "proxy". Defaults to "anthropic".
    /// *   `ANTHROPIC_API_KEY`: Required for the anthropic provider.
    /// *   `ORACLE_URL`: Session API base URL for the proxy provider. Defaults to "http://localhost:3000".
    /// *   `DEEPGRAM_API_KEY`: Required for the anthropic provider; the proxy provider fetches it from the server when unset.
    /// *   `CHAT_MODEL`, `MAX_TOKENS`: (Optional) Model settings for the anthropic provider.
    /// *   `AUDIO_INPUT_DEVICE`: (Optional) Input device name. Defaults to the host default.
    /// *   `DRAIN_GRACE_MS`: (Optional) How long to wait for trailing transcripts. Defaults to 1000.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let provider = OracleProvider::parse(
            &env::var("ORACLE_PROVIDER").unwrap_or_else(|_| "anthropic".to_string()),
        )?;

        let anthropic_api_key = env::var("ANTHROPIC_API_KEY").ok().map(SecretString::from);
        let deepgram_api_key = env::var("DEEPGRAM_API_KEY").ok().map(SecretString::from);
        let oracle_url =
            env::var("ORACLE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let chat_model = env::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = parse_number("MAX_TOKENS", DEFAULT_MAX_TOKENS)?;
        let audio_input_device = env::var("AUDIO_INPUT_DEVICE").ok();
        let drain_grace = Duration::from_millis(parse_number(
            "DRAIN_GRACE_MS",
            DRAIN_GRACE.as_millis() as u64,
        )?);

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        if provider == OracleProvider::Anthropic {
            if anthropic_api_key.is_none() {
                return Err(ConfigError::MissingVar(
                    "ANTHROPIC_API_KEY must be set for the anthropic provider".to_string(),
                ));
            }
            if deepgram_api_key.is_none() {
                return Err(ConfigError::MissingVar(
                    "DEEPGRAM_API_KEY must be set for the anthropic provider".to_string(),
                ));
            }
        }

        Ok(Self {
            provider,
            anthropic_api_key,
            oracle_url,
            deepgram_api_key,
            chat_model,
            max_tokens,
            audio_input_device,
            drain_grace,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_are_case_insensitive() {
        assert_eq!(
            OracleProvider::parse("Proxy").unwrap(),
            OracleProvider::Proxy
        );
        assert_eq!(
            OracleProvider::parse("ANTHROPIC").unwrap(),
            OracleProvider::Anthropic
        );
        assert!(matches!(
            OracleProvider::parse("mistral"),
            Err(ConfigError::InvalidValue(name, _)) if name == "ORACLE_PROVIDER"
        ));
    }
}
