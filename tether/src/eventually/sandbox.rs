//! Failure capture for a single probe execution.
//!
//! A probe reports problems through the [`Checks`] handle it is given. Inside
//! [`run_captured`] those reports, and any ordinary panic raised on the calling
//! thread, are collected into an ordered list of [`FailureRecord`]s instead of
//! failing the caller. A [`Checks::terminate`] signal is never captured.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use super::escalation::{self, EscalationGuard};

/// A single failure reported by a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub message: String,
    /// Fatal failures stopped the probe early (a `require*` check or a panic).
    pub is_fatal: bool,
}

impl FailureRecord {
    pub fn non_fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_fatal: false,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_fatal: true,
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fatal {
            write!(f, "fatal: {}", self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Marker returned by the `require*` checks after recording a fatal failure.
///
/// Only this module can construct it, so every early exit has a matching record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeAbort(());

/// What a probe returns: `Ok(())` when it ran to completion.
pub type ProbeResult = Result<(), ProbeAbort>;

/// Panic payload for failures that must never be captured.
#[derive(Debug, Clone)]
pub struct Terminate(pub String);

/// Failure reporting handle passed to every probe execution.
#[derive(Debug, Default)]
pub struct Checks {
    records: Vec<FailureRecord>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a non-fatal failure and keep going.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.record(FailureRecord::non_fatal(message));
    }

    /// Record a non-fatal failure unless `condition` holds.
    pub fn check(&mut self, condition: bool, message: impl Into<String>) -> bool {
        if !condition {
            self.fail(message);
        }
        condition
    }

    pub fn check_eq<T: PartialEq + fmt::Debug>(
        &mut self,
        actual: T,
        expected: T,
        what: &str,
    ) -> bool {
        if actual == expected {
            return true;
        }
        self.fail(format!("{what}: expected {expected:?}, got {actual:?}"));
        false
    }

    /// Record a fatal failure unless `condition` holds.
    ///
    /// Use with `?` so the probe stops at the first unmet requirement.
    pub fn require(&mut self, condition: bool, message: impl Into<String>) -> ProbeResult {
        if condition {
            Ok(())
        } else {
            Err(self.abort(message))
        }
    }

    pub fn require_some<T>(
        &mut self,
        value: Option<T>,
        message: impl Into<String>,
    ) -> Result<T, ProbeAbort> {
        value.ok_or_else(|| self.abort(message))
    }

    pub fn require_ok<T, E: fmt::Display>(
        &mut self,
        result: Result<T, E>,
        context: &str,
    ) -> Result<T, ProbeAbort> {
        result.map_err(|e| self.abort(format!("{context}: {e}")))
    }

    /// Fail unconditionally. Never captured by a sandbox.
    pub fn terminate(&self, message: impl Into<String>) -> ! {
        panic::panic_any(Terminate(message.into()))
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<FailureRecord> {
        self.records
    }

    fn abort(&mut self, message: impl Into<String>) -> ProbeAbort {
        self.record(FailureRecord::fatal(message));
        ProbeAbort(())
    }

    fn record(&mut self, record: FailureRecord) {
        if escalation::break_on_failure() {
            self.terminate(format!("break on failure: {}", record.message));
        }
        self.records.push(record);
    }
}

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
}

static QUIET_HOOK_INSTALLED: Once = Once::new();

/// Install a panic hook that stays silent for panics a sandbox is about to capture.
///
/// Panics on other threads, panics outside a sandbox and terminate signals
/// still go to the previously installed hook. Safe to call multiple times.
pub fn install_quiet_panic_hook() {
    QUIET_HOOK_INSTALLED.call_once(|| {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let captured = CAPTURING.with(Cell::get) && !info.payload().is::<Terminate>();
            if !captured {
                default_hook(info);
            }
        }));
    });
}

/// Marks the current thread as capturing until dropped.
struct CaptureScope {
    previous: bool,
}

impl CaptureScope {
    fn enter() -> Self {
        Self {
            previous: CAPTURING.with(|c| c.replace(true)),
        }
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        CAPTURING.with(|c| c.set(self.previous));
    }
}

/// Run `probe` once on this thread and return every failure it reported.
///
/// The break-on-failure switch is forced off for the duration of the call and
/// restored afterwards on every path. A [`Terminate`] panic is re-raised after
/// the switch has been restored; any other panic becomes a fatal record.
pub fn run_captured<F>(probe: F) -> Vec<FailureRecord>
where
    F: FnOnce(&mut Checks) -> ProbeResult,
{
    install_quiet_panic_hook();

    let mut checks = Checks::new();
    let outcome = {
        let _escalation = EscalationGuard::suppress();
        let _capture = CaptureScope::enter();
        panic::catch_unwind(AssertUnwindSafe(|| probe(&mut checks)))
    };

    let mut records = checks.into_records();
    if let Err(payload) = outcome {
        if payload.is::<Terminate>() {
            panic::resume_unwind(payload);
        }
        records.push(FailureRecord::fatal(format!(
            "probe panicked: {}",
            panic_message(payload.as_ref())
        )));
    }
    records
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(Terminate(s)) = payload.downcast_ref::<Terminate>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
