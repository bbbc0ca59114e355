// ABOUTME: GET /health liveness probe and GET /status backend snapshot
// ABOUTME: Health never touches the backend; status reports lifecycle state and pending calls
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::api_types::HealthResponse;
use crate::state::SharedState;

/// Handle GET /health
pub async fn handle() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Handle GET /status
///
/// Reports the backend's lifecycle state, generation, restart count and
/// the number of calls awaiting a response.
pub async fn status(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.gateway().status())
}
