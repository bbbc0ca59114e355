// ABOUTME: JSON-RPC 2.0 envelope types exchanged with the stdio MCP backend
// ABOUTME: Defines request/response/error shapes, MCP method names, and tool-call params
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::GatewayError;

/// JSON-RPC version marker carried by every envelope
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version announced during the optional handshake
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name reported to the backend during the handshake
pub const CLIENT_NAME: &str = "mcp-bridge";

/// Client version reported to the backend during the handshake
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// JSON-RPC Error Codes
// ============================================================================

/// JSON-RPC invalid request (e.g. wrong protocol version)
pub const INVALID_REQUEST: i64 = -32_600;

/// JSON-RPC method not found
pub const METHOD_NOT_FOUND: i64 = -32_601;

/// JSON-RPC invalid parameters
pub const INVALID_PARAMS: i64 = -32_602;

/// JSON-RPC internal error
pub const INTERNAL_ERROR: i64 = -32_603;

// ============================================================================
// Methods
// ============================================================================

/// Methods external callers may route through the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMethod {
    /// `tools/list`: fetch the backend's tool catalog
    ToolsList,
    /// `tools/call`: invoke one named tool
    ToolsCall,
}

impl ClientMethod {
    /// Wire name of the method
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
        }
    }

    /// Parse a wire method name, rejecting anything outside the closed set
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "tools/list" => Some(Self::ToolsList),
            "tools/call" => Some(Self::ToolsCall),
            _ => None,
        }
    }
}

// ============================================================================
// JSON-RPC Messages
// ============================================================================

/// Outgoing JSON-RPC request (or notification when `id` is `None`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version marker (always "2.0" on the wire)
    pub jsonrpc: String,
    /// Request identifier (absent for notifications)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request for an arbitrary method
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Build a `tools/list` request
    pub fn tools_list() -> Self {
        Self::new(
            ClientMethod::ToolsList.as_str(),
            Some(Value::Object(Map::new())),
        )
    }

    /// Build a `tools/call` request for the named tool
    pub fn tools_call(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        let params = serde_json::json!({
            "name": name.into(),
            "arguments": Value::Object(arguments),
        });
        Self::new(ClientMethod::ToolsCall.as_str(), Some(params))
    }

    /// Build the MCP `initialize` request sent during the handshake
    pub fn initialize() -> Self {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION },
        });
        Self::new("initialize", Some(params))
    }

    /// Build the `notifications/initialized` notification that ends the handshake
    pub fn initialized_notification() -> Self {
        Self::new("notifications/initialized", None)
    }

    /// Attach an identifier
    pub fn with_id(mut self, id: Value) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether this envelope is a notification (expects no reply)
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Incoming JSON-RPC response from the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Matching request identifier
    #[serde(default)]
    pub id: Option<Value>,
    /// Success payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code
    pub code: i64,
    /// Human-readable error message
    pub message: String,
    /// Additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Build a success response with the given result
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response carrying the given error object
    pub fn failure(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Build an error response with the given code and message
    pub fn error(id: Option<Value>, code: i64, message: String) -> Self {
        Self::failure(
            id,
            JsonRpcError {
                code,
                message,
                data: None,
            },
        )
    }

    /// Split into the result payload or the upstream error
    ///
    /// An upstream `error` object becomes a `Tool` error carrying its code,
    /// message and data unchanged.
    pub fn into_result(self) -> Result<Value, GatewayError> {
        if let Some(error) = self.error {
            return Err(GatewayError::tool(error));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

// ============================================================================
// MCP Tools
// ============================================================================

/// Parameters for a `tools/call` request
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    /// Name of the tool to invoke
    pub name: String,
    /// Tool arguments
    #[serde(default)]
    pub arguments: Option<Value>,
}
