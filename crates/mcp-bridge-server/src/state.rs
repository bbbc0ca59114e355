// ABOUTME: Server state holding the shared gateway handle
// ABOUTME: Every handler reaches the single backend subprocess through this state
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::sync::Arc;

use mcp_bridge::Gateway;

/// Shared server state handle
pub type SharedState = Arc<ServerState>;

/// Server state wrapping the gateway
///
/// The gateway serializes access to the child internally, so handlers
/// share it without any additional locking.
#[derive(Debug)]
pub struct ServerState {
    gateway: Gateway,
}

impl ServerState {
    /// Create server state around a started gateway
    pub const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// The shared gateway
    pub const fn gateway(&self) -> &Gateway {
        &self.gateway
    }
}
