// ABOUTME: Command-line flags for the gateway server and their translation into gateway config
// ABOUTME: Layers defaults, an optional TOML file, and flags, then resolves binary and token
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use mcp_bridge::config::{parse_env_keys, parse_timeout, FileConfig};
use mcp_bridge::discovery::discover_backend;
use mcp_bridge::{BackendConfig, GatewayConfig, GatewayError, TokenSource};
use tracing::info;

/// mcp-bridge-server: HTTP/SSE gateway for a stdio MCP server
#[derive(Debug, Parser)]
#[command(name = "mcp-bridge-server", version, about)]
pub struct Cli {
    /// HTTP listen port
    #[arg(long, default_value_t = 7444)]
    pub port: u16,

    /// HTTP listen host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Increase log verbosity (-v debug, -vv trace); `RUST_LOG` wins when set
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Backend binary (path or name on PATH); falls back to `MCP_BRIDGE_BINARY`
    #[arg(long)]
    pub binary: Option<PathBuf>,

    /// File holding the bearer token (default `~/.github_token`)
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    /// Environment variable holding the token, also used to pass it to the backend
    #[arg(long)]
    pub token_env: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long = "timeout-secs", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Restarts allowed over the gateway's lifetime (0 disables restarting)
    #[arg(long)]
    pub max_restarts: Option<u32>,

    /// Comma-separated environment keys passed through to the backend
    #[arg(long)]
    pub env_keys: Option<String>,

    /// Start the backend on the first call instead of at startup
    #[arg(long)]
    pub lazy: bool,

    /// Perform the MCP initialize handshake after every backend start
    #[arg(long)]
    pub handshake: bool,

    /// TOML file with gateway settings; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Default log filter for the selected verbosity
    pub const fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Build the gateway configuration
    ///
    /// Precedence: defaults, then the config file, then flags. The backend
    /// binary and the token are resolved last.
    pub fn gateway_config(&self) -> Result<GatewayConfig, GatewayError> {
        let file = self
            .config
            .as_deref()
            .map(FileConfig::load)
            .transpose()?
            .unwrap_or_default();

        let requested = self.binary.clone().or_else(|| file.binary.clone());
        let binary_path = discover_backend(requested.as_deref())?;

        let mut config = GatewayConfig::new(BackendConfig::new(binary_path.clone()));
        file.apply(&mut config);
        config.backend.binary_path = binary_path;

        if let Some(ref name) = self.token_env {
            config.backend.token_env.clone_from(name);
        }
        if let Some(ref keys) = self.env_keys {
            config.backend.allowed_env_keys = parse_env_keys(keys);
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout = timeout;
        }
        if let Some(max) = self.max_restarts {
            config.restart.max_restarts = max;
        }
        if self.lazy {
            config.lazy_start = true;
        }
        if self.handshake {
            config.backend.handshake = true;
        }

        let mut source = TokenSource::new(config.backend.token_env.clone());
        if let Some(path) = self.token_file.clone().or(file.token_file) {
            source = source.with_file(path);
        }
        let (token, origin) = source.resolve()?;
        info!(%origin, binary = %config.backend.binary_path.display(), "Resolved backend settings");
        config.backend.token = Some(token);

        Ok(config)
    }
}
