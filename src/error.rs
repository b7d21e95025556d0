use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to API callers.
///
/// Resolution failures of any kind collapse into [`ScoutError::LinkNotFound`];
/// driver detail is logged by the resolver and never reaches the body.
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Query parameter \"id\" is required")]
    MissingId,

    #[error("Could not find a streaming link (.m3u8) for {0}")]
    LinkNotFound(String),
}

impl ScoutError {
    pub fn status(&self) -> StatusCode {
        match self {
            ScoutError::MissingId => StatusCode::BAD_REQUEST,
            ScoutError::LinkNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ScoutError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;
