//! Port discovery through a scripted lsof stand-in

#![cfg(unix)]

use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;
use tether::bind::{BindError, PortPoller};

use super::helpers::{flaky_lsof, recorded_args};

fn poller_for(dir: &TempDir) -> PortPoller {
    PortPoller::new().search_dirs(vec![dir.path().to_path_buf()])
}

#[test]
#[serial]
fn test_tool_that_fails_twice_then_reports_port() {
    let dir = flaky_lsof(2, "p4242\\nf7\\nn*:43210\\n");

    let port = poller_for(&dir)
        .wait_for_tcp_bind(4242, Duration::from_secs(10))
        .unwrap();

    assert_eq!(port, 43210);
    let calls = recorded_args(dir.path());
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2], "-wbnP -Ffn -p 4242 -a -i 4TCP");
}

#[test]
#[serial]
fn test_udp_filter_reaches_tool() {
    let dir = flaky_lsof(0, "p77\\nf9\\nn*:5353\\n");

    let port = poller_for(&dir)
        .wait_for_udp_bind(77, Duration::from_secs(10))
        .unwrap();

    assert_eq!(port, 5353);
    assert_eq!(recorded_args(dir.path()), vec!["-wbnP -Ffn -p 77 -a -i 4UDP"]);
}

#[test]
#[serial]
fn test_malformed_output_fails_on_first_call() {
    let dir = flaky_lsof(0, "p77\\nn*:5353\\n");

    let err = poller_for(&dir)
        .wait_for_tcp_bind(77, Duration::from_secs(10))
        .unwrap_err();

    assert!(matches!(err, BindError::MalformedOutput { .. }), "{err}");
    assert_eq!(recorded_args(dir.path()).len(), 1);
}

#[test]
#[serial]
fn test_persistent_failure_surfaces_tool_stderr() {
    let dir = flaky_lsof(u32::MAX, "");

    let err = poller_for(&dir)
        .wait_for_tcp_bind(1, Duration::from_millis(50))
        .unwrap_err();

    match err {
        BindError::Invocation { invocation, .. } => {
            assert_eq!(invocation.status, Some(1));
            assert_eq!(invocation.stderr.trim(), "no sockets yet");
        }
        other => panic!("expected Invocation, got {other:?}"),
    }
}
