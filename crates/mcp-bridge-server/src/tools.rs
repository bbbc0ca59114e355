// ABOUTME: GET /tools and POST /tools/call handlers over the shared gateway
// ABOUTME: Returns the raw tool list and normalized tool results as plain JSON
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use crate::api_types::ToolCallRequest;
use crate::errors::{error_response, gateway_error_to_response};
use crate::state::SharedState;

/// Handle GET /tools
///
/// Returns the backend's `tools/list` result unchanged.
pub async fn list(State(state): State<SharedState>) -> Response {
    match state.gateway().list_tools().await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            debug!(error = %e, "tools/list failed");
            gateway_error_to_response(&e)
        }
    }
}

/// Handle POST /tools/call
///
/// Body: `{"name": "...", "arguments": {...}}`. Responds with the
/// normalized tool result.
pub async fn call(
    State(state): State<SharedState>,
    body: Result<Json<ToolCallRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON");
    };
    if request.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Tool name is required");
    }

    match state
        .gateway()
        .call_tool(&request.name, request.arguments)
        .await
    {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => {
            debug!(tool = %request.name, error = %e, "tools/call failed");
            gateway_error_to_response(&e)
        }
    }
}
