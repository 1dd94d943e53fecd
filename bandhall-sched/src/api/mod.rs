//! HTTP and WebSocket API

pub mod attendance;
pub mod health;
pub mod rehearsals;
pub mod ws;

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::{error, warn};

use bandhall_common::Error;

/// Error body returned by all endpoints
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

/// Map a domain error onto an HTTP response.
///
/// Rule and input validation surface as 422 so clients can show the
/// message; store failures stay generic.
pub fn error_response(err: Error) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidRule(_) | Error::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("request failed: {}", err);
    } else {
        warn!("request rejected: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            status: "error".to_string(),
            message: err.to_string(),
        }),
    )
}
