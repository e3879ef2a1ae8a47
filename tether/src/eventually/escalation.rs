//! Break-on-failure switch.
//!
//! When the switch is on, recording any failure outside a sandbox terminates the
//! probe immediately instead of being reported at the end of the run. The switch
//! is thread-local, so concurrent sandboxed sessions on different threads never
//! observe each other's save/restore.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};

/// Initial value for threads that have not touched the switch yet.
static DEFAULT_BREAK_ON_FAILURE: AtomicBool = AtomicBool::new(false);

thread_local! {
    static BREAK_ON_FAILURE: Cell<bool> =
        Cell::new(DEFAULT_BREAK_ON_FAILURE.load(Ordering::Relaxed));
}

/// Current value of the switch on this thread.
pub fn break_on_failure() -> bool {
    BREAK_ON_FAILURE.with(Cell::get)
}

/// Set the switch for this thread, returning the previous value.
pub fn set_break_on_failure(enabled: bool) -> bool {
    BREAK_ON_FAILURE.with(|cell| cell.replace(enabled))
}

/// Set the value new threads start with (e.g. from configuration).
///
/// Threads that already read the switch keep their current value.
pub fn set_default_break_on_failure(enabled: bool) {
    DEFAULT_BREAK_ON_FAILURE.store(enabled, Ordering::Relaxed);
}

/// Restores the switch to its saved value when dropped.
///
/// Drop runs on normal return and while unwinding, so the prior value is
/// restored even when a probe escalates to a terminating failure.
#[must_use = "the switch is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct EscalationGuard {
    previous: bool,
}

impl EscalationGuard {
    /// Force the switch off for the lifetime of the guard.
    pub fn suppress() -> Self {
        Self {
            previous: set_break_on_failure(false),
        }
    }
}

impl Drop for EscalationGuard {
    fn drop(&mut self) {
        set_break_on_failure(self.previous);
    }
}
