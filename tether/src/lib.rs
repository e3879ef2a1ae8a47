//! Coordination helpers for test harnesses.
//!
//! - [`eventually`]: retry a check until it passes or a deadline expires,
//!   capturing its failures in the meantime.
//! - [`bind`]: discover the port a running process has bound by polling `lsof`.

pub mod bind;
pub mod clock;
pub mod commands;
pub mod config;
pub mod eventually;
pub mod logging;
pub mod process;
pub mod tool;

pub use bind::{wait_for_tcp_bind, wait_for_udp_bind, BindError, PortPoller, Protocol};
pub use eventually::{
    assert_eventually, eventually, Checks, ProbeResult, RetryError, RetryScheduler,
};
