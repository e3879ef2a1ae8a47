//! Port discovery against the system lsof, skipped when it is not installed

use std::net::{TcpListener, UdpSocket};
use std::time::Duration;

use serial_test::serial;
use tether::config::BindConfig;
use tether::tool::find_executable;

fn lsof_available() -> bool {
    let config = BindConfig::default();
    find_executable(&config.tool, &config.search_dirs).is_ok()
}

#[test]
#[serial]
fn test_discovers_own_tcp_listener() {
    if !lsof_available() {
        eprintln!("lsof not installed, skipping");
        return;
    }

    let listener = TcpListener::bind("0.0.0.0:0").unwrap();
    let expected = listener.local_addr().unwrap().port();

    let port = tether::wait_for_tcp_bind(std::process::id(), Duration::from_secs(10)).unwrap();
    assert_eq!(port, expected);
}

#[test]
#[serial]
fn test_discovers_own_udp_socket() {
    if !lsof_available() {
        eprintln!("lsof not installed, skipping");
        return;
    }

    let socket = UdpSocket::bind("0.0.0.0:0").unwrap();
    let expected = socket.local_addr().unwrap().port();

    let port = tether::wait_for_udp_bind(std::process::id(), Duration::from_secs(10)).unwrap();
    assert_eq!(port, expected);
}
