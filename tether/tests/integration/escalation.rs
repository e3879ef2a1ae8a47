//! Break-on-failure driven by configuration
//!
//! Applying a config changes the starting value of the switch for every new
//! thread, so these tests and every other test that reports failures run
//! serially.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use serial_test::serial;
use tether::clock::ManualClock;
use tether::config::TetherConfig;
use tether::eventually::{break_on_failure, RetryScheduler, Terminate};

fn break_on_failure_config() -> TetherConfig {
    TetherConfig::parse("[retry]\nbreak_on_failure = true\n").unwrap()
}

#[test]
#[serial]
fn test_configured_break_escalates_only_the_final_run() {
    break_on_failure_config().apply();

    let clock = ManualClock::new();
    let mut calls = 0;
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        RetryScheduler::with_clock(Duration::from_millis(20), &clock).run(|c| {
            calls += 1;
            c.fail("not listening yet");
            Ok(())
        })
    }));
    let still_on = break_on_failure();
    TetherConfig::default().apply();

    // Captured attempts were retried; only the uncaptured run escalated
    assert!(calls > 1);
    assert!(still_on);
    let payload = result.unwrap_err();
    let Terminate(message) = payload.downcast_ref::<Terminate>().unwrap();
    assert_eq!(message, "break on failure: not listening yet");
}

#[test]
#[serial]
fn test_configured_break_applies_to_new_threads() {
    break_on_failure_config().apply();
    let enabled_on_new_thread = thread::spawn(break_on_failure).join().unwrap();

    TetherConfig::default().apply();
    let disabled_on_new_thread = !thread::spawn(break_on_failure).join().unwrap();

    assert!(enabled_on_new_thread);
    assert!(disabled_on_new_thread);
    assert!(!break_on_failure());
}
