pub mod handlers;
pub mod state;

use crate::config::Config;
use axum::{
    Router,
    http::{HeaderValue, Response},
    middleware,
    routing::get,
};
use state::AppState;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Build the router with headless Chromium behind it
pub fn build_router(config: Config) -> Router {
    router(AppState::new(config))
}

/// Build the router around prepared state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health::banner))
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::serve_metrics))
        .route("/api/video", get(handlers::video::resolve_video))
        .layer(middleware::map_response(add_version_header))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn add_version_header<B>(mut response: Response<B>) -> Response<B> {
    response.headers_mut().insert(
        "x-streamscout-version",
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
    response
}

/// Start the Axum HTTP server
pub async fn start(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("0.0.0.0:{}", config.port);

    let app = build_router(config);

    // Bind TCP listener
    let listener = match tokio::net::TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    info!("🚀 Server listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
