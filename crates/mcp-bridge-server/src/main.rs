// ABOUTME: CLI entry point for the mcp-bridge HTTP/SSE gateway binary
// ABOUTME: Parses arguments, starts the backend, and serves axum until Ctrl-C
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::sync::Arc;

use clap::Parser;
use mcp_bridge::{Gateway, GatewayError};

use mcp_bridge_server::cli::Cli;
use mcp_bridge_server::router;
use mcp_bridge_server::state::ServerState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_filter())),
        )
        .init();

    let config = cli.gateway_config()?;
    let gateway = Gateway::start(config).await?;
    let state = Arc::new(ServerState::new(gateway));
    let app = router::build(Arc::clone(&state));

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(address = %addr, "Starting mcp-bridge HTTP/SSE server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::internal(format!("Server error: {e}")))?;

    state.gateway().shutdown().await;
    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
