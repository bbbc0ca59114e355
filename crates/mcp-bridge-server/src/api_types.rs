// ABOUTME: Request and response bodies for the gateway's HTTP endpoints
// ABOUTME: Tool-call input, health and error envelopes, and SSE end-event constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Request Types
// ============================================================================

/// Body of `POST /tools/call`
#[derive(Debug, Deserialize)]
pub struct ToolCallRequest {
    /// Tool name; an empty or missing name is rejected with 400
    #[serde(default)]
    pub name: String,
    /// Tool arguments (defaults to `{}`)
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok" while the HTTP server is up
    pub status: &'static str,
}

/// Error body for every non-SSE failure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub error: String,
    /// Upstream JSON-RPC code, present for tool errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

impl ErrorResponse {
    /// Create an error body without a code
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: None,
        }
    }
}

// ============================================================================
// SSE
// ============================================================================

/// Event name carrying the JSON-RPC response
pub const DATA_EVENT: &str = "data";

/// Event name carrying a JSON-RPC error envelope
pub const ERROR_EVENT: &str = "error";

/// Terminal event name; its data is also `end`
pub const END_EVENT: &str = "end";

/// Response header telling nginx not to buffer the event stream
pub const ACCEL_BUFFERING: &str = "x-accel-buffering";
