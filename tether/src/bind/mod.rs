//! Discovery of the port a running process has bound.
//!
//! Processes rarely advertise the port they picked, so the poller asks `lsof`
//! for the process's IPv4 sockets until it answers. `lsof` can take a while to
//! see a fresh socket, hence the loop. Failed invocations are retried with a
//! linear backoff of `attempt * 10` milliseconds; output that `lsof` did
//! produce but that does not look as expected fails immediately.

pub mod parse;


use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::clock::{Clock, Deadline, SystemClock};
use crate::config::BindConfig;
use crate::tool::{find_executable, SubprocessRunner, ToolInvocation, ToolNotFound, ToolRunner};

pub use parse::parse_lsof_output;

/// Linear backoff step between failed invocations
const BACKOFF_STEP: Duration = Duration::from_millis(10);

/// Socket family filter passed to `lsof -i`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn lsof_filter(self) -> &'static str {
        match self {
            Protocol::Tcp => "4TCP",
            Protocol::Udp => "4UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BindError {
    #[error(transparent)]
    ToolNotFound(#[from] ToolNotFound),

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The last invocation before the deadline, reported as-is
    #[error("`{command}` failed: {invocation}")]
    Invocation {
        command: String,
        invocation: ToolInvocation,
    },

    #[error("unexpected lsof output: {output:?}")]
    MalformedOutput { output: String },
}

/// Arguments selecting one process's IPv4 sockets in field-per-line format:
/// no warnings, no blocking kernel calls, numeric hosts and ports.
pub fn lsof_args(pid: u32, protocol: Protocol) -> Vec<String> {
    vec![
        "-wbnP".to_string(),
        "-Ffn".to_string(),
        "-p".to_string(),
        pid.to_string(),
        "-a".to_string(),
        "-i".to_string(),
        protocol.lsof_filter().to_string(),
    ]
}

/// Polls `lsof` for a process's bound port.
#[derive(Debug, Clone)]
pub struct PortPoller<R = SubprocessRunner, C = SystemClock> {
    runner: R,
    clock: C,
    tool: String,
    search_dirs: Vec<PathBuf>,
}

impl PortPoller<SubprocessRunner, SystemClock> {
    pub fn new() -> Self {
        Self::from_config(&BindConfig::default())
    }

    pub fn from_config(config: &BindConfig) -> Self {
        Self::with_parts(
            SubprocessRunner::with_timeout(config.invocation_timeout()),
            SystemClock,
        )
        .tool(config.tool.clone())
        .search_dirs(config.search_dirs.clone())
    }
}

impl Default for PortPoller<SubprocessRunner, SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ToolRunner, C: Clock> PortPoller<R, C> {
    pub fn with_parts(runner: R, clock: C) -> Self {
        let defaults = BindConfig::default();
        Self {
            runner,
            clock,
            tool: defaults.tool,
            search_dirs: defaults.search_dirs,
        }
    }

    /// Name of the binary to run (default `lsof`).
    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Directories searched for the tool before `PATH`.
    pub fn search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    pub fn wait_for_tcp_bind(&self, pid: u32, timeout: Duration) -> Result<u16, BindError> {
        self.discover_port(pid, Protocol::Tcp, timeout)
    }

    pub fn wait_for_udp_bind(&self, pid: u32, timeout: Duration) -> Result<u16, BindError> {
        self.discover_port(pid, Protocol::Udp, timeout)
    }

    /// Wait until `pid` has an IPv4 socket of `protocol` bound on all
    /// interfaces and return its port.
    pub fn discover_port(
        &self,
        pid: u32,
        protocol: Protocol,
        timeout: Duration,
    ) -> Result<u16, BindError> {
        let tool = find_executable(&self.tool, &self.search_dirs)?;
        let args = lsof_args(pid, protocol);
        let command = format!("{} {}", tool.display(), args.join(" "));
        let deadline = Deadline::after(&self.clock, timeout);

        let mut attempt: u32 = 1;
        let output = loop {
            let failure = match self.runner.invoke(&tool, &args) {
                Ok(invocation) if invocation.success() => break invocation.stdout,
                Ok(invocation) => BindError::Invocation {
                    command: command.clone(),
                    invocation,
                },
                Err(source) => BindError::Spawn {
                    command: command.clone(),
                    source,
                },
            };

            if deadline.is_past(&self.clock) {
                return Err(failure);
            }

            debug!(pid, %protocol, attempt, error = %failure, "no bound port yet");
            self.clock.sleep(BACKOFF_STEP.saturating_mul(attempt));
            attempt = attempt.saturating_add(1);
        };

        let port = parse_lsof_output(&output)?;
        debug!(pid, %protocol, port, "determined bound port");
        Ok(port)
    }
}

/// Wait for `pid` to bind an IPv4 TCP port, using the system `lsof`.
pub fn wait_for_tcp_bind(pid: u32, timeout: Duration) -> Result<u16, BindError> {
    PortPoller::new().wait_for_tcp_bind(pid, timeout)
}

/// Wait for `pid` to bind an IPv4 UDP port, using the system `lsof`.
pub fn wait_for_udp_bind(pid: u32, timeout: Duration) -> Result<u16, BindError> {
    PortPoller::new().wait_for_udp_bind(pid, timeout)
}
