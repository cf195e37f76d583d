//! Tests for the socket listener.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use keel_config::SocketEndpoint;

use super::listener::SocketListener;
use super::{EchoHandler, ListenerError};

#[fixture]
fn tcp_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", 0)
}

fn wait_for_peers(handler: &EchoHandler, expected: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if handler.peers().len() >= expected {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn round_trip<S: std::io::Read + Write>(stream: &mut S, line: &str) -> String {
    writeln!(stream, "{line}").expect("write line");
    let mut reply = String::new();
    BufReader::new(stream)
        .read_line(&mut reply)
        .expect("read reply");
    reply
}

#[rstest]
fn idle_connections_do_not_block_new_ones(tcp_endpoint: SocketEndpoint) {
    let listener = SocketListener::bind(&tcp_endpoint).expect("bind tcp listener");
    let handler = Arc::new(EchoHandler::default());
    let handle = listener.start(handler.clone()).expect("start listener");
    let addr = handle.local_addr().expect("tcp listeners report an address");
    assert_ne!(addr.port(), 0, "ephemeral port should be resolved");

    let _idle = TcpStream::connect(addr).expect("connect idle client");
    let mut active = TcpStream::connect(addr).expect("connect active client");
    active
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("set read timeout");

    assert_eq!(round_trip(&mut active, "ping"), "PING\n");
    assert!(wait_for_peers(&handler, 2), "expected two connections");
    assert!(handler.peers().iter().all(|peer| peer.starts_with("tcp:127.0.0.1")));

    handle.shutdown();
    handle.join().expect("join listener");
}

#[cfg(unix)]
#[fixture]
fn unix_tempdir() -> tempfile::TempDir {
    tempfile::tempdir().expect("temp dir")
}

#[cfg(unix)]
fn unix_endpoint(dir: &tempfile::TempDir) -> (std::path::PathBuf, SocketEndpoint) {
    let path = dir.path().join("keeld.sock");
    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_owned());
    (path, endpoint)
}

#[cfg(unix)]
#[rstest]
fn unix_listener_replaces_stale_socket_and_removes_it_on_shutdown(
    unix_tempdir: tempfile::TempDir,
) {
    let (path, endpoint) = unix_endpoint(&unix_tempdir);
    drop(std::os::unix::net::UnixListener::bind(&path).expect("bind stale listener"));
    assert!(path.exists(), "stale socket should remain");

    let listener = SocketListener::bind(&endpoint).expect("bind over stale socket");
    assert!(listener.local_addr().is_none());
    let handler = Arc::new(EchoHandler::default());
    let handle = listener.start(handler.clone()).expect("start listener");

    let mut client = std::os::unix::net::UnixStream::connect(&path).expect("connect unix client");
    assert_eq!(round_trip(&mut client, "hello"), "HELLO\n");
    assert_eq!(handler.peers(), vec!["unix".to_owned()]);

    handle.shutdown();
    handle.join().expect("join listener");
    assert!(!path.exists(), "listener should remove its socket on shutdown");
}

#[cfg(unix)]
#[rstest]
fn unix_listener_refuses_a_live_socket(unix_tempdir: tempfile::TempDir) {
    let (path, endpoint) = unix_endpoint(&unix_tempdir);
    let _live = std::os::unix::net::UnixListener::bind(&path).expect("bind live listener");

    let error = SocketListener::bind(&endpoint).expect_err("socket is in use");
    assert!(matches!(error, ListenerError::SocketInUse { .. }));
    assert!(path.exists(), "live socket must not be removed");
}

#[cfg(unix)]
#[rstest]
fn unix_listener_leaves_regular_files_alone(unix_tempdir: tempfile::TempDir) {
    let (path, endpoint) = unix_endpoint(&unix_tempdir);
    std::fs::write(&path, b"not a socket").expect("write placeholder");

    let error = SocketListener::bind(&endpoint).expect_err("path is not a socket");
    assert!(matches!(error, ListenerError::NotASocket { .. }));
    assert_eq!(std::fs::read(&path).expect("file kept"), b"not a socket");
}

#[cfg(not(unix))]
#[test]
fn unix_endpoints_are_unsupported_off_unix() {
    let endpoint = SocketEndpoint::unix("C:/keel/keeld.sock");
    let error = SocketListener::bind(&endpoint).expect_err("no unix sockets here");
    assert!(matches!(error, ListenerError::UnixUnsupported { .. }));
}
