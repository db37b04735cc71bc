//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[cfg(feature = "kokoro")]
use crate::engines::kokoro::KokoroError;

/// An error returned to the client as `{"success": false, "error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    envelope: bool,
}

impl ApiError {
    pub fn with_status(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            envelope: true,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Render as a bare `{"error": ...}` body, as file downloads do.
    pub fn bare(mut self) -> Self {
        self.envelope = false;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("Request failed: {}", self.message);
        } else {
            log::debug!("Request rejected ({}): {}", self.status, self.message);
        }

        let body = if self.envelope {
            json!({ "success": false, "error": self.message })
        } else {
            json!({ "error": self.message })
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<crate::Error> for ApiError {
    fn from(err: crate::Error) -> Self {
        match &err {
            crate::Error::InvalidInput(msg) => ApiError::bad_request(msg.clone()),
            crate::Error::InvalidReference(_) | crate::Error::Decode(_) => {
                ApiError::bad_request(err.to_string())
            }
            #[cfg(feature = "kokoro")]
            crate::Error::Kokoro(
                KokoroError::VoiceNotFound(_) | KokoroError::UnsupportedLanguage(_),
            ) => ApiError::bad_request(err.to_string()),
            _ => ApiError::internal(err.to_string()),
        }
    }
}
