//! Configuration loaded from `tether.toml`.
//!
//! Every field is optional; a missing file or section means defaults.
//!
//! ```toml
//! [retry]
//! timeout_ms = 10000
//! break_on_failure = false
//!
//! [bind]
//! tool = "lsof"
//! search_dirs = ["/sbin", "/usr/sbin"]
//! timeout_ms = 30000
//! invocation_timeout_ms = 30000
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::eventually::escalation;
use crate::tool::DEFAULT_INVOCATION_TIMEOUT;

/// Default config file name, looked up in the current directory
pub const CONFIG_FILE_NAME: &str = "tether.toml";

/// Default retry timeout (10 seconds)
pub const DEFAULT_RETRY_TIMEOUT_MS: u64 = 10_000;

/// Default bound-port discovery timeout (30 seconds)
pub const DEFAULT_BIND_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    pub retry: RetryConfig,
    pub bind: BindConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub timeout_ms: u64,
    /// Escalate failures reported outside a retry sandbox immediately
    pub break_on_failure: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_RETRY_TIMEOUT_MS,
            break_on_failure: false,
        }
    }
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    /// Introspection binary to run
    pub tool: String,
    /// Checked in order before `PATH`
    pub search_dirs: Vec<PathBuf>,
    pub timeout_ms: u64,
    /// Ceiling for one tool run; the child is killed past it
    pub invocation_timeout_ms: u64,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            tool: "lsof".to_string(),
            search_dirs: vec![PathBuf::from("/sbin"), PathBuf::from("/usr/sbin")],
            timeout_ms: DEFAULT_BIND_TIMEOUT_MS,
            invocation_timeout_ms: DEFAULT_INVOCATION_TIMEOUT.as_millis() as u64,
        }
    }
}

impl BindConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }
}

impl TetherConfig {
    /// Load configuration from `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid tether configuration")
    }

    /// Make the break-on-failure setting the starting value for new threads
    /// and for the current one.
    pub fn apply(&self) {
        escalation::set_default_break_on_failure(self.retry.break_on_failure);
        escalation::set_break_on_failure(self.retry.break_on_failure);
    }
}
