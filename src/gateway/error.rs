use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::rpc::{Code, Status};

pub type ApiResult<T> = Result<T, ApiError>;

/// Downstream status adapted to HTTP. Only not-found, invalid-argument and
/// unauthenticated messages are forwarded to clients; everything else gets
/// a generic body.
#[derive(Debug)]
pub struct ApiError(pub Status);

impl From<Status> for ApiError {
    fn from(status: Status) -> Self {
        Self(status)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let Status { code, message } = self.0;
        let (http_status, message) = match code {
            Code::NotFound => (StatusCode::NOT_FOUND, message),
            Code::InvalidArgument => (StatusCode::BAD_REQUEST, message),
            Code::Unauthenticated => (StatusCode::UNAUTHORIZED, message),
            Code::AlreadyExists => {
                (StatusCode::CONFLICT, "resource already exists".to_string())
            }
            _ => {
                tracing::error!(code = ?code, error = %message, "downstream call failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (http_status, Json(json!({ "error": message }))).into_response()
    }
}
