// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`TiergateError`] to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tiergate_anthropic::{ErrorResponse, StreamEvent};
use tiergate_core::TiergateError;

/// A request failure rendered in the Anthropic error envelope.
#[derive(Debug)]
pub enum ApiError {
    /// The body did not parse as a Messages request.
    InvalidRequest(String),
    NotFound(String),
    Router(TiergateError),
}

impl From<TiergateError> for ApiError {
    fn from(err: TiergateError) -> Self {
        ApiError::Router(err)
    }
}

/// HTTP status for a router error.
pub fn status_for(err: &TiergateError) -> StatusCode {
    match err {
        TiergateError::Translation(_) => StatusCode::BAD_REQUEST,
        TiergateError::NoBackendAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        TiergateError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        TiergateError::Backend { .. } => StatusCode::BAD_GATEWAY,
        TiergateError::ClientCancelled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
        }
        TiergateError::Config(_) | TiergateError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Anthropic `error.type` for a router error.
pub fn error_type(err: &TiergateError) -> &'static str {
    match err {
        TiergateError::Translation(_) => "invalid_request_error",
        TiergateError::NoBackendAvailable { .. } => "overloaded_error",
        TiergateError::BackendTimeout { .. } => "timeout_error",
        TiergateError::Backend { .. } => "api_error",
        TiergateError::ClientCancelled => "cancelled",
        TiergateError::Config(_) | TiergateError::Internal(_) => "api_error",
    }
}

/// The terminal SSE event for a failure after streaming began.
pub fn error_event(err: &TiergateError) -> StreamEvent {
    StreamEvent::error(error_type(err), err.to_string())
}

fn envelope(err: &TiergateError) -> ErrorResponse {
    let body = ErrorResponse::new(error_type(err), err.to_string());
    match err {
        TiergateError::NoBackendAvailable { skipped, .. } => body.with_skipped(skipped.clone()),
        _ => body,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("invalid_request_error", message)),
            )
                .into_response(),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("not_found_error", message)),
            )
                .into_response(),
            ApiError::Router(err) => (status_for(&err), Json(envelope(&err))).into_response(),
        }
    }
}
