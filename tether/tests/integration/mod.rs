//! Integration tests for tether
//!
//! These exercise the public API end to end: retries on the real clock, and
//! port discovery through real child processes (a scripted stand-in for lsof,
//! and the system lsof when it is installed).

pub mod escalation;
pub mod fake_lsof;
pub mod helpers;
pub mod retry;
pub mod system_lsof;
