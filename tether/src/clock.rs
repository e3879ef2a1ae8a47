//! Monotonic time source and deadline arithmetic shared by the polling engines.
//!
//! Both engines pace themselves through a [`Clock`] so that tests can swap in a
//! [`ManualClock`] and observe every sleep without waiting in real time.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Source of monotonic time plus the ability to block the current thread.
pub trait Clock {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Real clock backed by `Instant` and `thread::sleep`.
///
/// `Instant` is monotonic, so wall-clock adjustments never move a deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Virtual clock for tests.
///
/// Time only moves when something sleeps on it or when [`ManualClock::advance`]
/// is called. Every sleep is recorded in order.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Move virtual time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.elapsed = state.elapsed.saturating_add(duration);
    }

    /// Virtual time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // A panicking probe may poison the lock; the state is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().elapsed
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.elapsed = state.elapsed.saturating_add(duration);
        state.sleeps.push(duration);
    }
}

/// A fixed point in monotonic time, computed once from `now + timeout`.
///
/// A timeout too large to represent as an `Instant` yields a deadline that
/// never passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn after(clock: &impl Clock, timeout: Duration) -> Self {
        Self {
            at: clock.now().checked_add(timeout),
        }
    }

    /// True while `now < deadline`.
    pub fn is_pending(&self, clock: &impl Clock) -> bool {
        match self.at {
            Some(at) => clock.now() < at,
            None => true,
        }
    }

    /// True once `now > deadline` (strictly past it).
    pub fn is_past(&self, clock: &impl Clock) -> bool {
        match self.at {
            Some(at) => clock.now() > at,
            None => false,
        }
    }

    /// Time left before the deadline, zero once it has been reached.
    pub fn remaining(&self, clock: &impl Clock) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(clock.now()))
    }
}
