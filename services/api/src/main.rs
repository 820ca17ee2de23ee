mod config;
mod error;
mod routes;

use crate::config::Config;
use crate::routes::AppState;
use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use session_zero_core::anthropic::{AnthropicConfig, AnthropicOracle};
use session_zero_core::prompts::Prompts;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

fn app(state: Arc<AppState>) -> Router {
    // Configure a permissive CORS policy so a browser front end on another origin can call in.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/deepgram-key", get(routes::deepgram_key))
        .route("/api/chat", post(routes::chat))
        .route("/api/start-session", post(routes::start_session))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load server configuration")?;

    // Initialize the tracing subscriber for logging.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    if config.deepgram_api_key.is_none() {
        tracing::warn!("DEEPGRAM_API_KEY is not set; /api/deepgram-key will fail");
    }

    let oracle = AnthropicOracle::new(
        AnthropicConfig::builder(config.anthropic_api_key)
            .with_model(&config.chat_model)
            .with_max_tokens(config.max_tokens)
            .build(),
        Prompts::default(),
    );
    let state = Arc::new(AppState {
        oracle: Arc::new(oracle),
        deepgram_api_key: config.deepgram_api_key,
    });

    info!("Session API listening on {} (model {})", config.bind_address, config.chat_model);

    // Create a TCP listener and bind it to the address.
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    // Run the server.
    axum::serve(listener, app(state)).await?;

    Ok(())
}
