use crate::{
    error::{Result, ScoutError},
    metrics,
    server::state::AppState,
    service::{LinkSource, ResolvedLink},
};
use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Query parameters for `/api/video`
#[derive(Debug, Deserialize)]
pub struct VideoParams {
    /// Embed identifier to resolve
    id: Option<String>,
}

/// Success body for `/api/video`
#[derive(Debug, Serialize)]
pub struct VideoLink {
    success: bool,
    url: String,
    source: LinkSource,
}

impl From<ResolvedLink> for VideoLink {
    fn from(link: ResolvedLink) -> Self {
        Self {
            success: true,
            url: link.url,
            source: link.source,
        }
    }
}

/// Resolve an embed identifier to its HLS manifest URL
///
/// Answers from cache when a fresh link exists, otherwise opens a browser
/// session against the embed page. Any resolution failure is a 404. A query
/// string that does not parse (e.g. a repeated `id`) is treated like a
/// missing id.
pub async fn resolve_video(
    query: std::result::Result<Query<VideoParams>, QueryRejection>,
    State(state): State<AppState>,
) -> Result<Json<VideoLink>> {
    let start = Instant::now();

    let id = match query {
        Ok(Query(params)) => params.id,
        Err(rejection) => {
            debug!("Rejected query string: {}", rejection.body_text());
            None
        }
    };

    let outcome = match id.as_deref() {
        Some(id) => {
            info!("Link requested for id: {}", id);
            state.links.get_link(id).await
        }
        None => Err(ScoutError::MissingId),
    };

    let status = match &outcome {
        Ok(_) => 200,
        Err(e) => e.status().as_u16(),
    };
    metrics::record_request("video", status);
    metrics::record_duration("video", start);

    outcome.map(|link| Json(link.into()))
}
