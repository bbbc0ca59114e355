// ABOUTME: Integration tests for the mcp-bridge-server HTTP and SSE endpoints
// ABOUTME: Drives the axum router against a scripted fake MCP backend via tower oneshot
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mcp_bridge::{BackendConfig, Gateway, GatewayConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

use mcp_bridge_server::router;
use mcp_bridge_server::state::{ServerState, SharedState};

/// Fake upstream: lists one tool, answers `get_me`, rejects every other tool
const FAKE_BACKEND: &str = r#"while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"get_me"}]}}\n' "$id" ;;
    *'"name":"get_me"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"{\\"login\\":\\"octocat\\"}"}]}}\n' "$id" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32602,"message":"unknown tool"}}\n' "$id" ;;
  esac
done
"#;

/// Build a test app whose backend is started on the first call
fn test_app(dir: &tempfile::TempDir) -> (axum::Router, SharedState) {
    let script = dir.path().join("github-mcp-server.sh");
    std::fs::write(&script, FAKE_BACKEND).expect("write script");
    let backend = BackendConfig::new(PathBuf::from("/bin/sh"))
        .with_args(vec![script.display().to_string(), "stdio".to_owned()])
        .with_startup_grace(Duration::from_millis(50));
    let config = GatewayConfig::new(backend)
        .with_request_timeout(Duration::from_secs(5))
        .with_lazy_start(true);
    let state = Arc::new(ServerState::new(Gateway::new(config)));
    (router::build(Arc::clone(&state)), state)
}

/// Build a POST request from a JSON body
fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serialize")))
        .expect("build request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

/// Send a request and return the status and raw body text
async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.expect("send request");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect")
        .to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

/// Send a request and parse the response body as JSON
async fn send_and_parse(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, text) = send(app, request).await;
    let json = serde_json::from_str(&text).unwrap_or(Value::Null);
    (status, json)
}

/// Split an SSE body into `(event, data)` pairs
fn parse_events(body: &str) -> Vec<(String, String)> {
    body.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .filter_map(|block| {
            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_owned());
                } else if let Some(chunk) = line.strip_prefix("data:") {
                    data.push(chunk.trim_start().to_owned());
                }
            }
            event.map(|event| (event, data.join("\n")))
        })
        .collect()
}

// ============================================================================
// Health, Status, Fallback
// ============================================================================

#[tokio::test]
async fn health_returns_ok_without_starting_backend() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, state) = test_app(&dir);

    let (status, json) = send_and_parse(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"status": "ok"}));
    assert_eq!(state.gateway().status().generation, 0);
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, _state) = test_app(&dir);

    let (status, json) = send_and_parse(app, get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, json!({"error": "Not found"}));
}

#[tokio::test]
async fn status_reports_running_after_a_call() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, state) = test_app(&dir);

    let (_, before) = send_and_parse(app.clone(), get("/status")).await;
    assert_eq!(before["state"], "idle");

    let (status, _) = send_and_parse(app.clone(), get("/tools")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, after) = send_and_parse(app, get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after["state"], "running");
    assert_eq!(after["generation"], 1);
    assert_eq!(after["pending"], 0);
    state.gateway().shutdown().await;
}

// ============================================================================
// Tool Endpoints
// ============================================================================

#[tokio::test]
async fn tools_list_returns_raw_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, state) = test_app(&dir);

    let (status, json) = send_and_parse(app, get("/tools")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"tools": [{"name": "get_me"}]}));
    state.gateway().shutdown().await;
}

#[tokio::test]
async fn get_me_returns_normalized_login() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, state) = test_app(&dir);

    let body = json!({"name": "get_me", "arguments": {}});
    let (status, json) = send_and_parse(app, post_json("/tools/call", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"login": "octocat"}));
    state.gateway().shutdown().await;
}

#[tokio::test]
async fn tool_call_without_name_is_400() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, state) = test_app(&dir);

    let (status, json) =
        send_and_parse(app, post_json("/tools/call", &json!({"arguments": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Tool name is required");
    assert_eq!(state.gateway().status().generation, 0);
}

#[tokio::test]
async fn tool_call_with_invalid_json_is_400() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, _state) = test_app(&dir);

    let request = Request::builder()
        .method("POST")
        .uri("/tools/call")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("build request");
    let (status, json) = send_and_parse(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid JSON");
}

#[tokio::test]
async fn upstream_tool_error_is_502_with_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, state) = test_app(&dir);

    let body = json!({"name": "delete_everything"});
    let (status, json) = send_and_parse(app, post_json("/tools/call", &body)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "unknown tool");
    assert_eq!(json["code"], -32_602);
    state.gateway().shutdown().await;
}

// ============================================================================
// SSE Endpoint
// ============================================================================

#[tokio::test]
async fn sse_tools_list_emits_one_data_then_one_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, state) = test_app(&dir);

    let body = json!({"jsonrpc": "2.0", "id": "abc", "method": "tools/list", "params": {}});
    let response = app.oneshot(post_json("/sse", &body)).await.expect("send request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-accel-buffering").map(|v| v.as_bytes()),
        Some(&b"no"[..])
    );
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream")));
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect")
        .to_bytes();
    let text = String::from_utf8_lossy(&bytes).into_owned();

    let events = parse_events(&text);
    assert_eq!(events.len(), 2, "unexpected events: {events:?}");
    assert_eq!(events[0].0, "data");
    assert_eq!(events[1], ("end".to_owned(), "end".to_owned()));

    let response: Value = serde_json::from_str(&events[0].1).expect("data is JSON");
    assert_eq!(response["id"], "abc");
    assert_eq!(response["result"], json!({"tools": [{"name": "get_me"}]}));
    state.gateway().shutdown().await;
}

#[tokio::test]
async fn sse_tools_call_returns_raw_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, state) = test_app(&dir);

    let body = json!({
        "jsonrpc": "2.0",
        "id": 9,
        "method": "tools/call",
        "params": {"name": "get_me", "arguments": {}}
    });
    let (_, text) = send(app, post_json("/sse", &body)).await;
    let events = parse_events(&text);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, "data");

    let response: Value = serde_json::from_str(&events[0].1).expect("data is JSON");
    assert_eq!(response["id"], 9);
    assert_eq!(
        response["result"]["content"][0]["text"],
        "{\"login\":\"octocat\"}"
    );
    state.gateway().shutdown().await;
}

#[tokio::test]
async fn sse_unsupported_method_emits_error_then_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, state) = test_app(&dir);

    let body = json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"});
    let (status, text) = send(app, post_json("/sse", &body)).await;
    assert_eq!(status, StatusCode::OK);

    let events = parse_events(&text);
    assert_eq!(events.len(), 2, "unexpected events: {events:?}");
    assert_eq!(events[0].0, "error");
    assert_eq!(events[1].0, "end");

    let envelope: Value = serde_json::from_str(&events[0].1).expect("error is JSON");
    assert_eq!(envelope["jsonrpc"], "2.0");
    assert_eq!(envelope["id"], 1);
    assert_eq!(envelope["error"]["code"], -32_601);
    assert_eq!(state.gateway().status().generation, 0);
}

#[tokio::test]
async fn sse_tools_call_without_name_emits_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, _state) = test_app(&dir);

    let body = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {}});
    let (_, text) = send(app, post_json("/sse", &body)).await;
    let events = parse_events(&text);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, "error");

    let envelope: Value = serde_json::from_str(&events[0].1).expect("error is JSON");
    assert_eq!(envelope["error"]["message"], "Tool name is required");
}

#[tokio::test]
async fn sse_upstream_error_is_forwarded_verbatim() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, state) = test_app(&dir);

    let body = json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/call",
        "params": {"name": "delete_everything"}
    });
    let (_, text) = send(app, post_json("/sse", &body)).await;
    let events = parse_events(&text);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, "error");

    let envelope: Value = serde_json::from_str(&events[0].1).expect("error is JSON");
    assert_eq!(envelope["id"], 3);
    assert_eq!(
        envelope["error"],
        json!({"code": -32_602, "message": "unknown tool"})
    );
    state.gateway().shutdown().await;
}

#[tokio::test]
async fn sse_missing_method_is_400() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, _state) = test_app(&dir);

    let (status, json) = send_and_parse(app, post_json("/sse", &json!({"jsonrpc": "2.0", "id": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid JSON-RPC request");
}

#[tokio::test]
async fn sse_missing_jsonrpc_is_400() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (app, _state) = test_app(&dir);

    let (status, _) =
        send_and_parse(app, post_json("/sse", &json!({"method": "tools/list"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
