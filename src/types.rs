// ABOUTME: Core types for the gateway: error taxonomy and backend status snapshots
// ABOUTME: Provides GatewayError with per-kind constructors and JSON-RPC / HTTP code mapping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # Core Types
//!
//! The single error type shared by every layer of the gateway, plus the
//! status snapshot reported by the lifecycle supervisor.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::protocol::{JsonRpcError, INTERNAL_ERROR, INVALID_REQUEST};

// ============================================================================
// Gateway-specific JSON-RPC error codes (implementation-defined range)
// ============================================================================

/// Caller deadline elapsed before the backend answered
pub const TIMEOUT_ERROR: i64 = -32_001;

/// Backend process failed to launch
pub const STARTUP_ERROR: i64 = -32_002;

/// Backend process exited or the gateway is shutting down
pub const TRANSPORT_CLOSED_ERROR: i64 = -32_003;

/// In-flight call invalidated by a backend restart
pub const TRANSPORT_RESTARTED_ERROR: i64 = -32_004;

/// Backend wrote something that is not a valid JSON-RPC response
pub const BACKEND_PROTOCOL_ERROR: i64 = -32_005;

/// No backend available and restarting is disabled or exhausted
pub const BACKEND_UNAVAILABLE_ERROR: i64 = -32_006;

// ============================================================================
// Error Type
// ============================================================================

/// Error type for every gateway operation
#[derive(Debug, Clone)]
pub struct GatewayError {
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// JSON-RPC error code (upstream code for `Tool`, gateway code otherwise)
    pub code: Option<i64>,
    /// Upstream error data, passed through verbatim for `Tool`
    pub data: Option<Value>,
}

/// Categories of errors produced by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Request could not be serialized to a single wire line
    Encoding,
    /// Caller input rejected before reaching the backend
    InvalidRequest,
    /// Backend process failed to launch or died inside the grace window
    Startup,
    /// Backend process has exited (or the gateway stopped it)
    TransportClosed,
    /// In-flight call invalidated because the backend was restarted
    TransportRestarted,
    /// A line from the backend failed to decode
    MalformedResponse,
    /// Backend violated the protocol; caller-visible form of `MalformedResponse`
    BackendProtocol,
    /// Caller deadline elapsed
    Timeout,
    /// Backend returned a JSON-RPC error object
    Tool,
    /// No backend and no restart possible; calls fail fast
    BackendUnavailable,
    /// Gateway configuration error
    Config,
    /// Internal gateway error (bug, unexpected state)
    Internal,
}

impl GatewayError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            data: None,
        }
    }

    /// Create an encoding error
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Encoding, message)
    }

    /// Create an invalid-request error with a specific JSON-RPC code
    pub fn invalid_request(code: i64, message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::InvalidRequest, message);
        err.code = Some(code);
        err
    }

    /// Create a startup error
    pub fn startup(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Startup, message)
    }

    /// Create a transport-closed error
    pub fn transport_closed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportClosed, message)
    }

    /// Create a transport-restarted error for a call written under `generation`
    pub fn transport_restarted(generation: u64) -> Self {
        Self::new(
            ErrorKind::TransportRestarted,
            format!("backend generation {generation} was restarted while the call was in flight"),
        )
    }

    /// Create a malformed-response error
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }

    /// Create a backend protocol error
    pub fn backend_protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendProtocol, message)
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Wrap an upstream JSON-RPC error object verbatim
    pub fn tool(error: JsonRpcError) -> Self {
        Self {
            kind: ErrorKind::Tool,
            message: error.message,
            code: Some(error.code),
            data: error.data,
        }
    }

    /// Create a backend-unavailable error
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnavailable, message)
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Convert a decode failure into the error a caller sees
    #[must_use]
    pub fn into_caller_facing(self) -> Self {
        if self.kind == ErrorKind::MalformedResponse {
            Self {
                kind: ErrorKind::BackendProtocol,
                ..self
            }
        } else {
            self
        }
    }

    /// Whether a transport-level retry via restart is appropriate
    pub const fn is_transport_failure(&self) -> bool {
        matches!(self.kind, ErrorKind::TransportClosed)
    }

    /// JSON-RPC error code reported to SSE and JSON-RPC callers
    pub const fn rpc_code(&self) -> i64 {
        if let Some(code) = self.code {
            return code;
        }
        match self.kind {
            ErrorKind::Encoding | ErrorKind::InvalidRequest => INVALID_REQUEST,
            ErrorKind::Startup => STARTUP_ERROR,
            ErrorKind::TransportClosed => TRANSPORT_CLOSED_ERROR,
            ErrorKind::TransportRestarted => TRANSPORT_RESTARTED_ERROR,
            ErrorKind::MalformedResponse | ErrorKind::BackendProtocol | ErrorKind::Tool => {
                BACKEND_PROTOCOL_ERROR
            }
            ErrorKind::Timeout => TIMEOUT_ERROR,
            ErrorKind::BackendUnavailable => BACKEND_UNAVAILABLE_ERROR,
            ErrorKind::Config | ErrorKind::Internal => INTERNAL_ERROR,
        }
    }

    /// Render as a JSON-RPC error object
    pub fn to_rpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.rpc_code(),
            message: self.message.clone(),
            data: self.data.clone(),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) if self.kind == ErrorKind::Tool => {
                write!(f, "{:?}: {} (code {code})", self.kind, self.message)
            }
            _ => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for GatewayError {}

// ============================================================================
// Backend Status
// ============================================================================

/// Lifecycle state of the backend subprocess
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendState {
    /// Not started yet (lazy start)
    Idle,
    /// A child process is running
    Running,
    /// The last child exited; a restart is pending or in progress
    Restarting,
    /// Restarting is disabled or exhausted; calls fail fast
    Unavailable,
    /// The gateway was shut down
    Stopped,
}

/// Point-in-time view of the backend for operators
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    /// Current lifecycle state
    pub state: BackendState,
    /// Generation of the current (or last) child process
    pub generation: u64,
    /// Number of restarts performed so far
    pub restarts: u32,
    /// Correlation entries currently waiting for a response
    pub pending: usize,
}
