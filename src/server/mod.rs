//! JSON HTTP surface over the download pipeline.

mod error_response;
mod routes;

use crate::config::ServerConfig;
use crate::media::MediaService;
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub media: Arc<MediaService>,
}

/// Routes:
/// - `POST /api/gallery` - resolve a post link and list its images
/// - `GET /download-single` - download one image, optionally converted
/// - `POST /download-zip` - download several images as a streamed ZIP
pub fn create_router(media: Arc<MediaService>) -> Router {
    Router::new()
        .route("/api/gallery", post(routes::load_gallery))
        .route("/download-single", get(routes::download_single))
        .route("/download-zip", post(routes::download_zip))
        .with_state(AppState { media })
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(config: &ServerConfig, media: Arc<MediaService>) -> Result<()> {
    let app = create_router(media);

    let listener = TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("Listening on {}", config.bind_address);

    axum::serve(listener, app)
        .await
        .context("HTTP server stopped unexpectedly")?;
    Ok(())
}
