// ABOUTME: POST /sse handler streaming one JSON-RPC response as Server-Sent Events
// ABOUTME: Emits exactly one data or error event followed by exactly one end event
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use mcp_bridge::protocol::{CallToolParams, ClientMethod, INVALID_PARAMS, METHOD_NOT_FOUND};
use mcp_bridge::{GatewayError, JsonRpcRequest, JsonRpcResponse};
use serde_json::Value;
use tracing::debug;

use crate::api_types::{ACCEL_BUFFERING, DATA_EVENT, END_EVENT, ERROR_EVENT};
use crate::errors::error_response;
use crate::state::SharedState;

/// Handle POST /sse
///
/// The body is a full JSON-RPC envelope. Methods other than `tools/list`
/// and `tools/call` (and `tools/call` without `params.name`) are answered
/// with an `error` event rather than an HTTP error, so the stream shape is
/// always one `data` or `error` event and then a terminal `end` event.
///
/// A backend response carrying a JSON-RPC `error` object is sent as an
/// `error` event with the envelope unchanged, not as a `data` event, so
/// clients can tell failures from results by event name alone.
///
/// Dropping the connection drops the pending call, which abandons its
/// correlation entry. The response disables proxy buffering so nginx
/// delivers events as they are produced.
pub async fn handle(
    State(state): State<SharedState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON");
    };
    let Some(envelope) = body.as_object() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON-RPC request");
    };
    let (true, Some(method)) = (
        envelope.contains_key("jsonrpc"),
        envelope.get("method").and_then(Value::as_str),
    ) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON-RPC request");
    };

    let id = envelope.get("id").cloned().filter(|id| !id.is_null());
    let params = envelope.get("params").cloned();
    debug!(method, ?id, "SSE request received");

    let request = validate(method, params).map(|request| match id.clone() {
        Some(id) => request.with_id(id),
        None => request,
    });

    let reply = futures::stream::once(async move {
        let event = match request {
            Ok(request) => match state.gateway().forward(request).await {
                Ok(response) if response.error.is_some() => error_event(&response),
                Ok(response) => data_event(&response),
                Err(e) => error_event(&failure(id, &e)),
            },
            Err(e) => error_event(&failure(id, &e)),
        };
        Ok::<_, Infallible>(event)
    });
    let end = futures::stream::once(async {
        Ok::<_, Infallible>(Event::default().event(END_EVENT).data(END_EVENT))
    });

    let sse = Sse::new(reply.chain(end)).keep_alive(KeepAlive::default());
    ([(ACCEL_BUFFERING, "no")], sse).into_response()
}

/// Check the method and parameters a caller may send through the gateway
fn validate(method: &str, params: Option<Value>) -> Result<JsonRpcRequest, GatewayError> {
    match ClientMethod::parse(method) {
        Some(ClientMethod::ToolsList) => Ok(JsonRpcRequest::new(method, params)),
        Some(ClientMethod::ToolsCall) => {
            let has_name = params
                .clone()
                .and_then(|p| serde_json::from_value::<CallToolParams>(p).ok())
                .is_some_and(|p| !p.name.is_empty());
            if has_name {
                Ok(JsonRpcRequest::new(method, params))
            } else {
                Err(GatewayError::invalid_request(
                    INVALID_PARAMS,
                    "Tool name is required",
                ))
            }
        }
        None => Err(GatewayError::invalid_request(
            METHOD_NOT_FOUND,
            format!("Unsupported method: {method}"),
        )),
    }
}

fn failure(id: Option<Value>, err: &GatewayError) -> JsonRpcResponse {
    JsonRpcResponse::failure(id, err.to_rpc_error())
}

fn data_event(response: &JsonRpcResponse) -> Event {
    let json = serde_json::to_string(response).unwrap_or_default();
    Event::default().event(DATA_EVENT).data(json)
}

fn error_event(response: &JsonRpcResponse) -> Event {
    let json = serde_json::to_string(response).unwrap_or_default();
    Event::default().event(ERROR_EVENT).data(json)
}
