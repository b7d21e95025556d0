use crate::server::state::AppState;
use axum::{Json, extract::State};
use serde_json::{Value, json};

/// Plain-text liveness banner
pub async fn banner() -> &'static str {
    "streamscout is running! Use /api/video?id=YOUR_ID"
}

/// Health check with basic runtime stats
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cached_links": state.links.cache().len(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}
