// ABOUTME: Protocol gateway library sharing one stdio JSON-RPC subprocess among many callers
// ABOUTME: Re-exports the gateway facade, configuration, protocol envelopes, and error types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # mcp-bridge: stdio JSON-RPC gateway
//!
//! Runs one long-lived MCP server child (the GitHub MCP Server launched as
//! `github-mcp-server stdio`) and multiplexes many concurrent callers onto
//! its newline-delimited JSON-RPC stream. The gateway owns the child's
//! lifecycle, correlates responses FIFO, normalizes double-encoded tool
//! results, and maps every failure to a [`GatewayError`](types::GatewayError).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcp_bridge::{BackendConfig, Gateway, GatewayConfig};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), mcp_bridge::types::GatewayError> {
//! let backend = BackendConfig::new(PathBuf::from("github-mcp-server"));
//! let gateway = Gateway::start(GatewayConfig::new(backend)).await?;
//! let me = gateway.call_tool("get_me", serde_json::Map::new()).await?;
//! println!("{me}");
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`]: error taxonomy and backend status
//! - [`protocol`]: JSON-RPC envelopes and MCP method names
//! - [`codec`]: line framing, encoding, and strict decoding
//! - [`normalize`]: unwrapping of text-content tool results
//! - [`config`]: backend, restart, and timeout configuration
//! - [`credential`]: bearer token lookup and redaction
//! - [`sandbox`]: environment whitelisting for the child
//! - [`discovery`]: locating the backend binary
//! - [`process`]: the owned subprocess transport
//! - [`correlation`]: wire id to caller bookkeeping
//! - [`supervisor`]: start, restart, and failure policy
//! - [`router`]: request queueing and the transport worker
//! - [`gateway`]: the facade used by front ends

/// Error taxonomy and backend status
pub mod types;

/// Line codec for the backend stream
pub mod codec;
/// Backend configuration and restart policy
pub mod config;
/// Wire id to caller correlation
pub mod correlation;
/// Bearer token lookup
pub mod credential;
/// Backend binary discovery
pub mod discovery;
/// Gateway facade
pub mod gateway;
/// Tool result normalization
pub mod normalize;
/// Subprocess transport
pub mod process;
/// JSON-RPC and MCP envelopes
pub mod protocol;
/// Request router and transport worker
pub mod router;
/// Environment sandboxing for the child
pub mod sandbox;
/// Backend lifecycle supervision
pub mod supervisor;

pub use config::{BackendConfig, GatewayConfig, RestartPolicy};
pub use credential::{BearerToken, TokenSource};
pub use gateway::Gateway;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use types::{BackendState, BackendStatus, ErrorKind, GatewayError};
