// ABOUTME: Locates the upstream MCP server binary on the host
// ABOUTME: Resolves an explicit path, an environment override, or a PATH lookup via `which`
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{BINARY_ENV_OVERRIDE, DEFAULT_BINARY_NAME};
use crate::types::GatewayError;

/// Find the backend binary
///
/// Resolution order:
/// 1. `explicit` (the `--binary` flag), used as a path when it contains a
///    separator and looked up on `PATH` otherwise
/// 2. the `MCP_BRIDGE_BINARY` environment variable
/// 3. `github-mcp-server` on `PATH`
///
/// # Errors
///
/// Returns a `Config` error if the binary cannot be found.
pub fn discover_backend(explicit: Option<&Path>) -> Result<PathBuf, GatewayError> {
    if let Some(path) = explicit {
        if path.components().count() > 1 || path.is_absolute() {
            return resolve_binary(DEFAULT_BINARY_NAME, Some(&path.to_string_lossy()));
        }
        return resolve_binary(&path.to_string_lossy(), None);
    }

    let env_override = env::var(BINARY_ENV_OVERRIDE).ok();
    resolve_binary(DEFAULT_BINARY_NAME, env_override.as_deref())
}

/// Resolve a binary path by name, optionally using an override path
///
/// Resolution order:
/// 1. If `env_override` is `Some`, use that value as the path
/// 2. Otherwise, search `PATH` using `which`
///
/// # Errors
///
/// Returns a `Config` error if the binary cannot be found.
pub fn resolve_binary(name: &str, env_override: Option<&str>) -> Result<PathBuf, GatewayError> {
    if let Some(override_path) = env_override {
        let path = PathBuf::from(override_path);
        if path.exists() {
            debug!(binary = name, path = %path.display(), "Resolved via override");
            return Ok(path);
        }
        return Err(GatewayError::config(format!(
            "Override points to non-existent path: {override_path}"
        )));
    }

    which::which(name)
        .map_err(|e| GatewayError::config(format!("Binary '{name}' not found on PATH: {e}")))
}
