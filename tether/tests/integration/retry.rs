//! Retry engine on the real clock

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serial_test::serial;
use tether::eventually::{assert_eventually, eventually, RetryError, RetryScheduler};

#[test]
#[serial]
fn test_waits_for_background_work() {
    let ready = Arc::new(AtomicBool::new(false));
    let worker = {
        let ready = Arc::clone(&ready);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            ready.store(true, Ordering::SeqCst);
        })
    };

    let attempts = AtomicU32::new(0);
    assert_eventually(Duration::from_secs(5), |c| {
        attempts.fetch_add(1, Ordering::SeqCst);
        c.require(ready.load(Ordering::SeqCst), "worker not done")
    });

    worker.join().unwrap();
    assert!(attempts.load(Ordering::SeqCst) > 1);
}

#[test]
#[serial]
fn test_final_failure_keeps_probe_messages() {
    let start = Instant::now();
    let err = eventually(Duration::from_millis(30), |c| {
        c.check_eq(1 + 1, 3, "arithmetic");
        c.fail("second complaint");
        Ok(())
    })
    .unwrap_err();

    assert!(start.elapsed() >= Duration::from_millis(30));
    let RetryError::Failed { records, .. } = &err else {
        panic!("expected Failed, got {err:?}");
    };
    let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, vec!["arithmetic: expected 3, got 2", "second complaint"]);
}

#[test]
#[serial]
fn test_concurrent_sessions_are_independent() {
    let handles: Vec<_> = (0..4u32)
        .map(|i| {
            thread::spawn(move || {
                let mut calls = 0;
                RetryScheduler::new(Duration::from_secs(5))
                    .run(|c| {
                        calls += 1;
                        c.require(calls > i, format!("thread {i} attempt {calls}"))
                    })
                    .map(|()| calls)
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let calls = handle.join().unwrap().unwrap();
        assert_eq!(calls, i as u32 + 1);
    }
}
