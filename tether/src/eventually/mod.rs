//! Time-bounded retries of a fallible probe.
//!
//! [`RetryScheduler::run`] executes the probe inside a sandbox until it reports
//! no failures or the deadline passes. Between attempts it sleeps
//! `min(2^attempt, 1000)` milliseconds, cut short at the deadline. Once the
//! deadline has passed the probe runs one last time *without* a sandbox, so its
//! panics reach the caller unchanged and its failure records become the
//! returned error.
//!
//! ```ignore
//! use std::time::Duration;
//! use tether::eventually::assert_eventually;
//!
//! assert_eventually(Duration::from_secs(5), |c| {
//!     c.check_eq(server.connections(), 3, "open connections");
//!     Ok(())
//! });
//! ```

pub mod escalation;
pub mod sandbox;


use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{Clock, Deadline, SystemClock};

pub use escalation::{break_on_failure, set_break_on_failure, EscalationGuard};
pub use sandbox::{run_captured, Checks, FailureRecord, ProbeAbort, ProbeResult, Terminate};

/// Longest sleep between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_millis(1000);

/// Sleep taken after failed attempt `attempt` (0-indexed): `min(2^attempt, 1000)` ms.
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let millis = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(millis).min(MAX_BACKOFF)
}

/// Terminal outcome of a retry session that never observed a passing attempt.
#[derive(Debug, Error)]
pub enum RetryError {
    /// The final, uncaptured run still reported failures.
    #[error(
        "probe still failing after {timeout:?} ({attempts} attempts): {}",
        join_records(.records)
    )]
    Failed {
        records: Vec<FailureRecord>,
        attempts: u32,
        timeout: Duration,
    },
    /// The final run passed, but only after the deadline.
    #[error("timed out after {timeout:?} waiting for the probe to pass ({attempts} attempts)")]
    TimedOut { timeout: Duration, attempts: u32 },
}

impl RetryError {
    /// Failure records from the final run (empty for [`RetryError::TimedOut`]).
    pub fn records(&self) -> &[FailureRecord] {
        match self {
            RetryError::Failed { records, .. } => records,
            RetryError::TimedOut { .. } => &[],
        }
    }

    /// Total probe executions, including the final uncaptured one.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Failed { attempts, .. } | RetryError::TimedOut { attempts, .. } => {
                *attempts
            }
        }
    }
}

fn join_records(records: &[FailureRecord]) -> String {
    records
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Retry settings. The backoff law itself is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Drives a probe until it passes or its deadline passes.
#[derive(Debug, Clone)]
pub struct RetryScheduler<C = SystemClock> {
    policy: RetryPolicy,
    clock: C,
}

impl RetryScheduler<SystemClock> {
    pub fn new(timeout: Duration) -> Self {
        Self::with_clock(timeout, SystemClock)
    }
}

impl<C: Clock> RetryScheduler<C> {
    pub fn with_clock(timeout: Duration, clock: C) -> Self {
        Self {
            policy: RetryPolicy::with_timeout(timeout),
            clock,
        }
    }

    /// Run `probe` until an attempt records no failures.
    ///
    /// The deadline is fixed once, before the first attempt. A zero timeout
    /// skips straight to the uncaptured final run.
    pub fn run<F>(&self, mut probe: F) -> Result<(), RetryError>
    where
        F: FnMut(&mut Checks) -> ProbeResult,
    {
        let timeout = self.policy.timeout;
        let deadline = Deadline::after(&self.clock, timeout);
        let mut attempt: u32 = 0;

        while deadline.is_pending(&self.clock) {
            let records = run_captured(&mut probe);
            if records.is_empty() {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "probe passed after retrying");
                }
                return Ok(());
            }

            // Never sleep past the deadline
            let backoff = backoff_for_attempt(attempt);
            let backoff = deadline.remaining(&self.clock).map_or(backoff, |r| r.min(backoff));
            let backoff_ms = backoff.as_millis() as u64;
            debug!(
                attempt,
                failures = records.len(),
                first = %records[0],
                backoff_ms,
                "probe failed, backing off"
            );
            self.clock.sleep(backoff);
            attempt = attempt.saturating_add(1);
        }

        let attempts = attempt.saturating_add(1);
        let timeout_ms = timeout.as_millis() as u64;
        warn!(timeout_ms, attempts, "deadline passed, running probe without capture");

        // Panics from this run are not caught. An early exit has already
        // left a fatal record behind, so the return value carries nothing new.
        let mut checks = Checks::new();
        let _ = probe(&mut checks);
        let records = checks.into_records();

        if records.is_empty() {
            Err(RetryError::TimedOut { timeout, attempts })
        } else {
            Err(RetryError::Failed {
                records,
                attempts,
                timeout,
            })
        }
    }
}

/// Retry `probe` on the system clock for up to `timeout`.
pub fn eventually<F>(timeout: Duration, probe: F) -> Result<(), RetryError>
where
    F: FnMut(&mut Checks) -> ProbeResult,
{
    RetryScheduler::new(timeout).run(probe)
}

/// Like [`eventually`], but panics with the terminal failure. Meant for tests.
#[track_caller]
pub fn assert_eventually<F>(timeout: Duration, probe: F)
where
    F: FnMut(&mut Checks) -> ProbeResult,
{
    if let Err(e) = eventually(timeout, probe) {
        panic!("{e}");
    }
}
