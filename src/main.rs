//! Manim Studio - streaming code generation orchestrator
//!
//! Submits prompts to a generation backend, streams generated animation
//! code back into per-conversation message lists, and tracks each
//! conversation's AI state through code generation and video rendering.

mod api;
mod backend;
mod config;
mod registry;
mod session;
mod state_machine;
mod store;
mod studio;
mod transport;

use api::{create_router, AppState};
use backend::HttpChatBackend;
use config::StudioConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use studio::Studio;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::HttpStreamSource;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "manim_studio=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = StudioConfig::from_env()?;
    tracing::info!(
        backend = %config.backend_url,
        port = config.port,
        idle_timeout = ?config.stream_idle_timeout,
        "Configuration loaded"
    );

    let source = HttpStreamSource::new(&config.backend_url, config.connect_timeout)?;
    let backend = HttpChatBackend::new(&config.backend_url, config.connect_timeout)?;
    let studio = Studio::new(Arc::new(source), Arc::new(backend), &config);

    // Best effort: the studio works without history
    if !studio.refresh().await {
        tracing::warn!("Starting without conversation history");
    }

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(AppState::new(studio.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Manim Studio listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    studio.shutdown();
    Ok(())
}
