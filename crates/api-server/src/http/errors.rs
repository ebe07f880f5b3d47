use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chat_core::commerce::DirectoryError;
use chat_core::models::ErrorResponse;
use chat_core::orchestrator::ChatError;
use tracing::error;

pub(super) const INVALID_JSON: &str = "Invalid JSON";

pub(super) fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

pub(super) fn bad_request_response(message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, message)
}

pub(super) fn unauthorized_response() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "Invalid token.")
}

pub(super) fn internal_error_response(message: &str) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

pub(super) fn directory_error_response(err: DirectoryError) -> Response {
    error!("storefront lookup failed: {err}");
    internal_error_response("Unexpected server error")
}

pub(super) fn chat_error_response(err: ChatError) -> Response {
    match err {
        ChatError::Validation(message) => bad_request_response(&message),
        other => {
            error!("chat turn failed: {other}");
            internal_error_response(&other.to_string())
        }
    }
}
