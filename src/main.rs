//! Mirror Chat - single-page chat front-end for a hosted Gemini model
//!
//! Replies can be passed through the mirror transform, read aloud, and
//! interleaved with a timer-driven soliloquy. Every turn is appended to a
//! per-session log file.

mod api;
mod config;
mod llm;
mod mirror;
mod narrator;
mod runtime;
mod session_log;
mod state_machine;

use api::{create_router, AppState};
use config::ServerConfig;
use llm::{create_service, LlmConfig};
use narrator::Narrator;
use runtime::{LlmClient, RuntimeManager, ServiceLlmClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mirror_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = ServerConfig::from_env();
    let llm_config = LlmConfig::from_env();

    let service = create_service(&llm_config);
    if service.is_some() {
        tracing::info!(
            model = %llm_config.model,
            gateway = ?llm_config.gateway,
            "Gemini client initialized"
        );
    } else {
        tracing::warn!("No LLM credentials configured. Set GEMINI_API_KEY or LLM_GATEWAY.");
    }
    let llm_client: Arc<dyn LlmClient> = Arc::new(ServiceLlmClient::new(service));

    let narrator = Arc::new(Narrator::from_config(&config.speech));

    tracing::info!(
        log_dir = %config.log_dir.display(),
        soliloquy_delay_ms = config.soliloquy_delay.as_millis(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        speech = narrator.is_available(),
        "Session settings"
    );

    // Create application state
    let state = AppState::new(RuntimeManager::new(
        llm_client,
        narrator,
        config.log_dir.clone(),
        config.soliloquy_delay,
        config.idle_timeout,
    ));

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Mirror Chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
