//! wait-bind command - prints the port a running process has bound

use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::bind::{PortPoller, Protocol};
use crate::config::TetherConfig;
use crate::process::is_process_alive;

/// Wait for `pid` to bind an IPv4 port and print it on stdout
pub fn execute(
    config: &TetherConfig,
    pid: u32,
    protocol: Protocol,
    timeout: Option<Duration>,
) -> Result<()> {
    if !is_process_alive(pid) {
        bail!("No process with pid {pid}");
    }

    let timeout = timeout.unwrap_or_else(|| config.bind.timeout());
    let port = PortPoller::from_config(&config.bind)
        .discover_port(pid, protocol, timeout)
        .with_context(|| format!("Failed to discover {protocol} port bound by pid {pid}"))?;

    println!("{port}");
    Ok(())
}
