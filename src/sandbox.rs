// ABOUTME: Environment sandboxing for the backend subprocess
// ABOUTME: Clears the environment, whitelists keys, injects the credential, and sets the cwd
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::env;
use std::path::PathBuf;

use tokio::process::Command;
use tracing::debug;

use crate::config::{default_allowed_env_keys, BackendConfig};
use crate::credential::BearerToken;

/// Policy controlling the subprocess execution environment
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    /// Environment variable keys to pass through from the host
    pub allowed_env_keys: Vec<String>,
    /// Working directory for the subprocess (inherits the gateway's when `None`)
    pub working_directory: Option<PathBuf>,
    /// Credential and the variable it is injected as
    pub credential: Option<(String, BearerToken)>,
}

impl SandboxPolicy {
    /// Create a policy with the standard env keys and no credential
    #[must_use]
    pub fn new() -> Self {
        Self {
            allowed_env_keys: default_allowed_env_keys(),
            working_directory: None,
            credential: None,
        }
    }

    /// Derive the policy for a backend configuration
    #[must_use]
    pub fn for_backend(config: &BackendConfig) -> Self {
        Self {
            allowed_env_keys: config.allowed_env_keys.clone(),
            working_directory: config.working_directory.clone(),
            credential: config
                .token
                .clone()
                .map(|token| (config.token_env.clone(), token)),
        }
    }

    /// Create a policy with custom allowed environment keys
    #[must_use]
    pub fn with_env_keys(mut self, keys: Vec<String>) -> Self {
        self.allowed_env_keys = keys;
        self
    }

    /// Inject `token` as the environment variable `name`
    #[must_use]
    pub fn with_credential(mut self, name: impl Into<String>, token: BearerToken) -> Self {
        self.credential = Some((name.into(), token));
        self
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply sandbox policy to a command before execution
///
/// This clears the subprocess environment, then re-injects only the
/// allowed keys from the host environment plus the credential. The token
/// only ever travels through the environment, never the argument list.
pub fn apply_sandbox(cmd: &mut Command, policy: &SandboxPolicy) {
    cmd.env_clear();

    let mut resolved = Vec::new();
    let mut missing = Vec::new();
    for key in &policy.allowed_env_keys {
        if let Ok(value) = env::var(key) {
            cmd.env(key, &value);
            resolved.push(key.as_str());
        } else {
            missing.push(key.as_str());
        }
    }

    if let Some((ref name, ref token)) = policy.credential {
        cmd.env(name, token.expose());
    }

    if let Some(ref dir) = policy.working_directory {
        cmd.current_dir(dir);
    }

    debug!(
        cwd = ?policy.working_directory,
        resolved_count = resolved.len(),
        missing_count = missing.len(),
        ?missing,
        credential_env = policy.credential.as_ref().map(|(name, _)| name.as_str()),
        "Applied sandbox policy"
    );
}
