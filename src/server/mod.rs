//! # HTTP Server for Certificate Rendering
//!
//! Exposes CSV parsing, previews, exports, batch generation and image
//! uploads to the browser designer.
//!
//! ## Usage
//!
//! ```bash
//! certforge serve --listen 0.0.0.0:8080
//! ```
//!
//! | Route | Body | Response |
//! |-------|------|----------|
//! | `POST /api/csv/parse` | CSV text | `{headers, records}` |
//! | `POST /api/preview` | `{template, record?, mode}` | PNG |
//! | `POST /api/export` | `{template, record?}` | PDF |
//! | `POST /api/batch` | `{template, csv, filenamePattern, merged}` | PDF or JSON |
//! | `POST /api/assets` | multipart `image` | `{id, width, height}` |

mod handlers;
mod state;

pub use state::{AppState, ServerConfig};

use axum::{Router, extract::DefaultBodyLimit, routing::post};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::credit::CreditGate;
use crate::error::CertforgeError;

/// Build the router for `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/csv/parse", post(handlers::csv::parse))
        .route("/api/preview", post(handlers::preview::preview))
        .route("/api/export", post(handlers::export::export))
        .route("/api/batch", post(handlers::batch::generate))
        // Image uploads (20MB limit)
        .route(
            "/api/assets",
            post(handlers::assets::upload).layer(DefaultBodyLimit::max(20 * 1024 * 1024)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server.
///
/// ## Example
///
/// ```no_run
/// use std::sync::Arc;
/// use certforge::credit::UnmeteredGate;
/// use certforge::server::{serve, ServerConfig};
///
/// # async fn example() -> Result<(), certforge::CertforgeError> {
/// let config = ServerConfig {
///     listen_addr: "0.0.0.0:8080".to_string(),
///     engine: Default::default(),
///     allow_remote_images: false,
/// };
///
/// serve(config, Arc::new(UnmeteredGate)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn serve(config: ServerConfig, gate: Arc<dyn CreditGate>) -> Result<(), CertforgeError> {
    let app_state = Arc::new(AppState::new(config.clone(), gate)?);

    // Spawn background asset cleanup task
    tokio::spawn(cleanup_assets(app_state.clone()));

    let app = router(app_state);

    log::info!("certforge HTTP server listening on {}", config.listen_addr);
    if config.allow_remote_images {
        log::info!("[server] templates may reference remote images");
    }

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| {
            CertforgeError::Transport(format!("Failed to bind to {}: {}", config.listen_addr, e))
        })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| CertforgeError::Transport(format!("Server error: {}", e)))?;

    Ok(())
}

/// Background task to drop idle assets and cached images.
async fn cleanup_assets(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    let expiration = state.asset_expiration();

    loop {
        interval.tick().await;
        let removed = state.images.cleanup(expiration).await;
        if removed > 0 {
            log::info!("[assets] cleaned up {} expired image(s)", removed);
        }
    }
}
