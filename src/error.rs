//! Errors returned by the HTTP handlers.
//!
//! Every variant renders as `{"error": "<message>"}` with a status code, so the
//! browser always gets readable JSON and never a bare status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::image_prep::PrepareError;
use crate::runpod::RunpodError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Both source and target images are required")]
    MissingImages,

    #[error("RunPod API credentials not configured")]
    NotConfigured,

    /// Malformed request body or form.
    #[error("{message}")]
    BadRequest { status: StatusCode, message: String },

    #[error(transparent)]
    InvalidImage(#[from] PrepareError),

    #[error(transparent)]
    Runpod(#[from] RunpodError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingImages => StatusCode::BAD_REQUEST,
            ApiError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest { status, .. } => *status,
            ApiError::InvalidImage(PrepareError::Decode(_)) => StatusCode::BAD_REQUEST,
            ApiError::InvalidImage(PrepareError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            // Relay RunPod's own status code.
            ApiError::Runpod(RunpodError::Http { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ApiError::Runpod(RunpodError::Transport(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Runpod(RunpodError::InvalidJobId(_)) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
