//! Main Entrypoint for the AI Tutor API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the persisted tutor settings and the system prompt.
//! 3. Registering the response providers.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tutor_api::{
    config::Config, prompts::load_system_prompt, router::create_router, state::AppState,
};
use tutor_core::{
    config::{AppConfig, ConfigStore, ProviderKind},
    provider::{ProviderRegistry, gemini::GeminiProvider, openai::OpenAiProvider},
};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Settings and Prompts ---
    let seed = AppConfig {
        gemini_key: config.gemini_api_key.clone().unwrap_or_default(),
        ..AppConfig::default()
    };
    let settings = Arc::new(
        ConfigStore::load(&config.settings_path, seed).context("Failed to load tutor settings")?,
    );
    info!(path = %settings.path().display(), provider = %settings.current().provider, "Tutor settings loaded.");

    let system_prompt = Arc::new(
        load_system_prompt(config.prompts_path.as_deref())
            .context("Failed to load system prompt")?,
    );

    // --- 4. Register Providers ---
    let gemini = Arc::new(GeminiProvider::new(config.gemini_model.clone()));
    let mut providers = ProviderRegistry::new().with(ProviderKind::Gemini, gemini.clone());
    if config.enable_openai {
        info!(model = %config.openai_model, "Registering ChatGPT provider.");
        providers = providers.with(
            ProviderKind::OpenAi,
            Arc::new(OpenAiProvider::new(config.openai_model.clone())),
        );
    }

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        settings,
        providers,
        proxy: gemini,
        system_prompt,
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.gemini_model,
        openai = config.enable_openai,
        pacing_ms = config.pacing.as_millis() as u64,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
