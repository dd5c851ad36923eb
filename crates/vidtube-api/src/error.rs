use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

/// Every way a request can fail. This is the only place failures become
/// HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or blank fields, missing required file, malformed body.
    #[error("{0}")]
    BadRequest(String),

    /// Bad credentials, or a missing/invalid/superseded token.
    #[error("{0}")]
    Unauthorized(String),

    /// Username or email already taken.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// The remote asset store failed.
    #[error("{0}")]
    Upstream(String),

    /// The document store failed, or something else that is our fault.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            error!("{} {}", status.as_u16(), message);
        }

        let body = json!({
            "statusCode": status.as_u16(),
            "data": null,
            "message": message,
            "success": false,
        });
        (status, Json(body)).into_response()
    }
}
