// ABOUTME: Maps gateway errors onto HTTP status codes and JSON error bodies
// ABOUTME: Shared by the tool endpoints and the fallback handler
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mcp_bridge::types::{ErrorKind, GatewayError};

use crate::api_types::ErrorResponse;

/// HTTP status for a gateway error kind
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Encoding | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Startup
        | ErrorKind::TransportClosed
        | ErrorKind::TransportRestarted
        | ErrorKind::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::MalformedResponse | ErrorKind::BackendProtocol | ErrorKind::Tool => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Config | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a `GatewayError` into an HTTP error response
pub fn gateway_error_to_response(err: &GatewayError) -> Response {
    let body = ErrorResponse {
        error: err.message.clone(),
        code: (err.kind == ErrorKind::Tool).then_some(err.rpc_code()),
    };
    (status_for(err.kind), Json(body)).into_response()
}

/// Build an error response with the given status and message
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

/// Fallback for unknown routes
pub async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}
