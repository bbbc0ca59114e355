// ABOUTME: Axum router wiring the health, status, tool, and SSE endpoints
// ABOUTME: Adds a request-tracing middleware and a JSON 404 fallback
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tracing::{info, Instrument};

use crate::errors;
use crate::health;
use crate::sse;
use crate::state::SharedState;
use crate::tools;

/// Build the application router with all endpoints
///
/// Routes:
/// - `GET /health`: liveness, never touches the backend
/// - `GET /status`: backend lifecycle snapshot
/// - `GET /tools`: raw `tools/list` result
/// - `POST /tools/call`: normalized tool result
/// - `POST /sse`: JSON-RPC over Server-Sent Events
///
/// Anything else answers `404 {"error":"Not found"}`.
pub fn build(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health::handle))
        .route("/status", get(health::status))
        .route("/tools", get(tools::list))
        .route("/tools/call", post(tools::call))
        .route("/sse", post(sse::handle))
        .fallback(errors::not_found)
        .layer(middleware::from_fn(trace_requests))
        .with_state(state)
}

/// Wrap each request in a span and log its outcome
async fn trace_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let span = tracing::info_span!("http", %method, %path);
    let started = Instant::now();

    let response = next.run(request).instrument(span.clone()).await;

    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request handled"
        );
    });
    response
}
