// ABOUTME: Gateway facade wiring the correlation table, supervisor, and router together
// ABOUTME: Entry point used by front ends to list tools, call tools, and forward raw JSON-RPC
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::info;

use crate::config::GatewayConfig;
use crate::correlation::CorrelationTable;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::router::Router;
use crate::supervisor::Supervisor;
use crate::types::{BackendStatus, GatewayError};

/// One backend child shared by many callers
#[derive(Debug)]
pub struct Gateway {
    router: Router,
    supervisor: Arc<Supervisor>,
    request_timeout: Duration,
}

impl Gateway {
    /// Build the gateway, starting the backend unless `lazy_start` is set
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Startup` when the eager start fails.
    pub async fn start(config: GatewayConfig) -> Result<Self, GatewayError> {
        let lazy = config.lazy_start;
        let gateway = Self::new(config);
        if !lazy {
            gateway.supervisor.start().await?;
        }
        info!(lazy, timeout = ?gateway.request_timeout, "Gateway ready");
        Ok(gateway)
    }

    /// Build the gateway without starting the backend
    pub fn new(config: GatewayConfig) -> Self {
        let request_timeout = config.request_timeout;
        let table = Arc::new(CorrelationTable::new());
        let supervisor = Supervisor::new(config, Arc::clone(&table));
        let router = Router::new(Arc::clone(&supervisor), table);
        Self {
            router,
            supervisor,
            request_timeout,
        }
    }

    /// `tools/list`, returning the raw result
    pub async fn list_tools(&self) -> Result<Value, GatewayError> {
        self.router.list_tools(self.request_timeout).await
    }

    /// `tools/call`, returning the normalized result
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        self.router
            .call_tool(name, arguments, self.request_timeout)
            .await
    }

    /// Forward a caller's envelope and return the backend's response verbatim
    ///
    /// The response carries the caller's id; an upstream `error` object is
    /// left in the response rather than turned into an `Err`.
    pub async fn forward(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, GatewayError> {
        self.router.call(request, self.request_timeout).await
    }

    /// Backend lifecycle snapshot
    pub fn status(&self) -> BackendStatus {
        self.supervisor.status()
    }

    /// Stop the backend; later calls fail with `TransportClosed`
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }
}
