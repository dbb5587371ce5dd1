// src/server/error.rs

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::errors::HealtrackError;
use crate::stream::StreamError;

/// Engine errors mapped onto HTTP status codes.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<HealtrackError> for ApiError {
    fn from(err: HealtrackError) -> Self {
        let status = match &err {
            HealtrackError::ExecutionNotFound(_) => StatusCode::NOT_FOUND,
            HealtrackError::Stream(StreamError::UnknownChannel) => StatusCode::NOT_FOUND,
            HealtrackError::Stream(StreamError::Closed) => StatusCode::GONE,
            HealtrackError::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => {
                error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": { "message": self.message } }));
        (self.status, body).into_response()
    }
}
