// ABOUTME: Configuration types for the gateway and its backend subprocess
// ABOUTME: Defines backend launch settings, restart policy, timeouts, and env key parsing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use crate::codec::DEFAULT_MAX_FRAME_BYTES;
use crate::credential::BearerToken;

/// Default binary name of the upstream MCP server
pub const DEFAULT_BINARY_NAME: &str = "github-mcp-server";

/// Environment variable that can override the backend binary path
pub const BINARY_ENV_OVERRIDE: &str = "MCP_BRIDGE_BINARY";

/// Environment variable through which the backend receives its credential
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

/// Default per-call timeout (30 seconds)
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default upper bound on waiting for one response line (120 seconds)
const DEFAULT_STALL_TIMEOUT_SECS: u64 = 120;

/// Default grace window after spawn before the exit status is checked
const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(1);

/// Default time allowed for a graceful stop before force-killing
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of restarts over the gateway's lifetime
const DEFAULT_MAX_RESTARTS: u32 = 5;

/// Default base delay between restarts (doubles each time)
const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound on the restart backoff
const MAX_RESTART_BACKOFF: Duration = Duration::from_secs(30);

/// Number of stderr lines kept for crash diagnostics
const DEFAULT_STDERR_TAIL_LINES: usize = 50;

/// How to launch the backend subprocess
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Path to the upstream binary
    pub binary_path: PathBuf,
    /// Arguments passed to the binary (default: `stdio`)
    pub args: Vec<String>,
    /// Credential injected into the child's environment
    pub token: Option<BearerToken>,
    /// Name of the environment variable carrying the credential
    pub token_env: String,
    /// Environment variable keys passed through from the host
    pub allowed_env_keys: Vec<String>,
    /// Working directory for the subprocess
    pub working_directory: Option<PathBuf>,
    /// Delay after spawn before checking that the child is still alive
    pub startup_grace: Duration,
    /// Time allowed for a graceful stop before force-killing
    pub stop_timeout: Duration,
    /// Perform the MCP `initialize` handshake after every start
    pub handshake: bool,
    /// Number of stderr lines retained for crash reports
    pub stderr_tail_lines: usize,
    /// Maximum size of one response line
    pub max_frame_bytes: usize,
}

impl BackendConfig {
    /// Create a backend configuration for the given binary
    #[must_use]
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            args: vec!["stdio".to_owned()],
            token: None,
            token_env: DEFAULT_TOKEN_ENV.to_owned(),
            allowed_env_keys: default_allowed_env_keys(),
            working_directory: None,
            startup_grace: DEFAULT_STARTUP_GRACE,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            handshake: false,
            stderr_tail_lines: DEFAULT_STDERR_TAIL_LINES,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Replace the argument list
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Set the credential handed to the child
    #[must_use]
    pub fn with_token(mut self, token: BearerToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Set the environment variable name used for the credential
    #[must_use]
    pub fn with_token_env(mut self, name: impl Into<String>) -> Self {
        self.token_env = name.into();
        self
    }

    /// Set the environment variable keys passed through to the subprocess
    #[must_use]
    pub fn with_allowed_env_keys(mut self, keys: Vec<String>) -> Self {
        self.allowed_env_keys = keys;
        self
    }

    /// Set the working directory for the subprocess
    #[must_use]
    pub fn with_working_directory(mut self, dir: PathBuf) -> Self {
        self.working_directory = Some(dir);
        self
    }

    /// Set the startup grace window
    #[must_use]
    pub const fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    /// Set the graceful stop timeout
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Enable or disable the MCP handshake
    #[must_use]
    pub const fn with_handshake(mut self, enabled: bool) -> Self {
        self.handshake = enabled;
        self
    }

    /// Set the maximum response line size
    #[must_use]
    pub const fn with_max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }
}

/// When and how often the supervisor relaunches a dead backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Restarts allowed over the gateway's lifetime; `0` disables restarting
    pub max_restarts: u32,
    /// Base delay before a restart, doubled for each restart already performed
    pub backoff: Duration,
}

impl RestartPolicy {
    /// A policy that never restarts
    pub const fn disabled() -> Self {
        Self {
            max_restarts: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Whether another restart is allowed after `performed` restarts
    pub const fn allows(&self, performed: u32) -> bool {
        performed < self.max_restarts
    }

    /// Delay before the restart following `performed` restarts
    pub fn delay_for(&self, performed: u32) -> Duration {
        let factor = 2u32.saturating_pow(performed.min(16));
        self.backoff
            .checked_mul(factor)
            .map_or(MAX_RESTART_BACKOFF, |d| d.min(MAX_RESTART_BACKOFF))
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: DEFAULT_MAX_RESTARTS,
            backoff: DEFAULT_RESTART_BACKOFF,
        }
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Backend launch settings
    pub backend: BackendConfig,
    /// Default per-call deadline
    pub request_timeout: Duration,
    /// Upper bound on waiting for a single response line before restarting
    pub stall_timeout: Duration,
    /// Restart policy applied after unexpected exits
    pub restart: RestartPolicy,
    /// Defer starting the backend until the first call
    pub lazy_start: bool,
}

impl GatewayConfig {
    /// Create a gateway configuration around the given backend settings
    #[must_use]
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            stall_timeout: Duration::from_secs(DEFAULT_STALL_TIMEOUT_SECS),
            restart: RestartPolicy::default(),
            lazy_start: false,
        }
    }

    /// Set the default per-call timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the stall guard for a single response
    #[must_use]
    pub const fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set the restart policy
    #[must_use]
    pub const fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Defer the backend start until the first call
    #[must_use]
    pub const fn with_lazy_start(mut self, lazy: bool) -> Self {
        self.lazy_start = lazy;
        self
    }
}

/// Default set of environment variable keys safe to pass through to subprocesses
#[must_use]
pub fn default_allowed_env_keys() -> Vec<String> {
    ["HOME", "PATH", "TERM", "USER", "LANG"]
        .iter()
        .map(|k| (*k).to_owned())
        .collect()
}

/// Parse a comma-separated list of environment variable keys
#[must_use]
pub fn parse_env_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Parse a timeout value from a string (in seconds)
///
/// # Errors
///
/// Returns an error if the string cannot be parsed as a `u64`.
pub fn parse_timeout(input: &str) -> Result<Duration, ParseIntError> {
    input.trim().parse::<u64>().map(Duration::from_secs)
}

// ============================================================================
// Config File
// ============================================================================

/// Optional overrides loaded from a TOML file
///
/// Every field is optional; present fields replace the corresponding
/// default before command-line flags are applied.
#[cfg(feature = "config-file")]
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Backend binary path
    pub binary: Option<PathBuf>,
    /// Backend arguments
    pub args: Option<Vec<String>>,
    /// Environment variable carrying the credential
    pub token_env: Option<String>,
    /// File holding the credential
    pub token_file: Option<PathBuf>,
    /// Environment keys passed through to the backend
    pub allowed_env_keys: Option<Vec<String>>,
    /// Backend working directory
    pub working_directory: Option<PathBuf>,
    /// Per-call timeout in seconds
    pub request_timeout_secs: Option<u64>,
    /// Stall guard in seconds
    pub stall_timeout_secs: Option<u64>,
    /// Startup grace window in milliseconds
    pub startup_grace_ms: Option<u64>,
    /// Graceful stop timeout in milliseconds
    pub stop_timeout_ms: Option<u64>,
    /// Lifetime restart budget
    pub max_restarts: Option<u32>,
    /// Base restart backoff in milliseconds
    pub restart_backoff_ms: Option<u64>,
    /// Perform the MCP handshake
    pub handshake: Option<bool>,
    /// Defer the backend start until the first call
    pub lazy_start: Option<bool>,
}

#[cfg(feature = "config-file")]
impl FileConfig {
    /// Load overrides from a TOML file
    pub fn load(path: &std::path::Path) -> Result<Self, crate::types::GatewayError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            crate::types::GatewayError::config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&raw)
    }

    /// Parse overrides from TOML text
    pub fn parse(raw: &str) -> Result<Self, crate::types::GatewayError> {
        toml::from_str(raw)
            .map_err(|e| crate::types::GatewayError::config(format!("invalid config file: {e}")))
    }

    /// Apply the overrides present in this file to `config`
    pub fn apply(&self, config: &mut GatewayConfig) {
        let backend = &mut config.backend;
        if let Some(ref binary) = self.binary {
            backend.binary_path.clone_from(binary);
        }
        if let Some(ref args) = self.args {
            backend.args.clone_from(args);
        }
        if let Some(ref name) = self.token_env {
            backend.token_env.clone_from(name);
        }
        if let Some(ref keys) = self.allowed_env_keys {
            backend.allowed_env_keys.clone_from(keys);
        }
        if let Some(ref dir) = self.working_directory {
            backend.working_directory = Some(dir.clone());
        }
        if let Some(ms) = self.startup_grace_ms {
            backend.startup_grace = Duration::from_millis(ms);
        }
        if let Some(ms) = self.stop_timeout_ms {
            backend.stop_timeout = Duration::from_millis(ms);
        }
        if let Some(enabled) = self.handshake {
            backend.handshake = enabled;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.stall_timeout_secs {
            config.stall_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = self.max_restarts {
            config.restart.max_restarts = max;
        }
        if let Some(ms) = self.restart_backoff_ms {
            config.restart.backoff = Duration::from_millis(ms);
        }
        if let Some(lazy) = self.lazy_start {
            config.lazy_start = lazy;
        }
    }
}
