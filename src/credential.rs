// ABOUTME: Bearer-token collaborator supplying the backend credential from a file or env var
// ABOUTME: Wraps the secret in a redacting type so it never reaches logs or Debug output
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::GatewayError;

/// File name of the default token file in the user's home directory
pub const DEFAULT_TOKEN_FILE: &str = ".github_token";

/// A bearer token that refuses to print itself
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a token string, rejecting blank input
    pub fn new(raw: impl Into<String>) -> Result<Self, GatewayError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GatewayError::config("bearer token is empty"));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Expose the secret for injection into the child environment
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

impl fmt::Display for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Where a token was found, for diagnostics that must not include the token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOrigin {
    /// Read from this file
    File(PathBuf),
    /// Read from this environment variable
    Env(String),
}

impl fmt::Display for TokenOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Env(name) => write!(f, "environment variable {name}"),
        }
    }
}

/// Resolves the backend credential
///
/// Resolution order:
/// 1. The token file (explicit path, else `~/.github_token` when it exists)
/// 2. The environment variable (default `GITHUB_PERSONAL_ACCESS_TOKEN`)
#[derive(Debug, Clone)]
pub struct TokenSource {
    file: Option<PathBuf>,
    explicit_file: bool,
    env_key: String,
}

impl TokenSource {
    /// Source reading the default file and the given environment variable
    pub fn new(env_key: impl Into<String>) -> Self {
        Self {
            file: dirs::home_dir().map(|home| home.join(DEFAULT_TOKEN_FILE)),
            explicit_file: false,
            env_key: env_key.into(),
        }
    }

    /// Use an explicit token file; a missing explicit file is an error
    #[must_use]
    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file = Some(path);
        self.explicit_file = true;
        self
    }

    /// Skip the file lookup entirely
    #[must_use]
    pub fn without_file(mut self) -> Self {
        self.file = None;
        self.explicit_file = false;
        self
    }

    /// Resolve the token
    ///
    /// # Errors
    ///
    /// Returns a `Config` error when no source yields a token, when an
    /// explicit file is missing, or when a token file is readable by group
    /// or others.
    pub fn resolve(&self) -> Result<(BearerToken, TokenOrigin), GatewayError> {
        if let Some(ref path) = self.file {
            if path.exists() {
                let token = read_token_file(path)?;
                debug!(origin = %path.display(), "Resolved backend token from file");
                return Ok((token, TokenOrigin::File(path.clone())));
            }
            if self.explicit_file {
                return Err(GatewayError::config(format!(
                    "token file {} does not exist",
                    path.display()
                )));
            }
        }

        match env::var(&self.env_key) {
            Ok(raw) if !raw.trim().is_empty() => {
                debug!(origin = %self.env_key, "Resolved backend token from environment");
                Ok((BearerToken::new(raw)?, TokenOrigin::Env(self.env_key.clone())))
            }
            _ => Err(GatewayError::config(format!(
                "backend token not found: create {} or set {}",
                self.file
                    .as_ref()
                    .map_or_else(|| format!("~/{DEFAULT_TOKEN_FILE}"), |p| p.display().to_string()),
                self.env_key
            ))),
        }
    }
}

/// Read a token file, refusing files that other users could read
fn read_token_file(path: &Path) -> Result<BearerToken, GatewayError> {
    check_permissions(path)?;
    let raw = std::fs::read_to_string(path).map_err(|e| {
        GatewayError::config(format!("failed to read token file {}: {e}", path.display()))
    })?;
    BearerToken::new(raw)
        .map_err(|_| GatewayError::config(format!("token file {} is empty", path.display())))
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<(), GatewayError> {
    use std::os::unix::fs::PermissionsExt;

    let meta = std::fs::metadata(path).map_err(|e| {
        GatewayError::config(format!("failed to stat token file {}: {e}", path.display()))
    })?;
    let mode = meta.permissions().mode();
    if mode & 0o077 != 0 {
        return Err(GatewayError::config(format!(
            "token file {} has mode {:o}; restrict it to the owner (chmod 600)",
            path.display(),
            mode & 0o777
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<(), GatewayError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_redact() {
        let token = BearerToken::new("ghp_supersecret").expect("token");
        assert!(!format!("{token:?}").contains("supersecret"));
        assert!(!format!("{token}").contains("supersecret"));
        assert_eq!(token.expose(), "ghp_supersecret");
    }

    #[test]
    fn token_is_trimmed_and_blank_rejected() {
        assert_eq!(BearerToken::new("  abc\n").expect("token").expose(), "abc");
        assert!(BearerToken::new(" \n").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn reads_owner_only_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("token");
        std::fs::write(&path, "ghp_fromfile\n").expect("write");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).expect("chmod");

        let source = TokenSource::new("MCP_BRIDGE_TEST_UNSET_TOKEN").with_file(path.clone());
        let (token, origin) = source.resolve().expect("resolve");
        assert_eq!(token.expose(), "ghp_fromfile");
        assert_eq!(origin, TokenOrigin::File(path));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_world_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("token");
        std::fs::write(&path, "ghp_leaky").expect("write");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).expect("chmod");

        let err = TokenSource::new("MCP_BRIDGE_TEST_UNSET_TOKEN")
            .with_file(path)
            .resolve()
            .expect_err("insecure file");
        assert!(err.message.contains("chmod 600"));
        assert!(!err.message.contains("ghp_leaky"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = TokenSource::new("MCP_BRIDGE_TEST_UNSET_TOKEN")
            .with_file(PathBuf::from("/nonexistent/mcp-bridge/token"))
            .resolve()
            .expect_err("missing file");
        assert!(err.message.contains("does not exist"));
    }

    #[test]
    fn no_source_reports_both_options() {
        let err = TokenSource::new("MCP_BRIDGE_TEST_UNSET_TOKEN")
            .without_file()
            .resolve()
            .expect_err("no token");
        assert!(err.message.contains("MCP_BRIDGE_TEST_UNSET_TOKEN"));
    }
}
