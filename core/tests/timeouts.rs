//! Dial and header deadlines of `TimedTransport` against real sockets.

mod common;

use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mock_server::AppState;
use treestore_core::{Client, Config, Error, HeaderDeadline, Phase, Reference, TimedTransport};

use common::spawn_server;

fn timed(timeout: Duration) -> (Arc<TimedTransport>, Client) {
    let transport = Arc::new(TimedTransport::new(&Config::with_timeout(timeout)).unwrap());
    let client = Client::with_transport(transport.clone());
    (transport, client)
}

#[test]
fn slow_headers_time_out_with_positive_header_budget() {
    let timeout = Duration::from_millis(300);
    let addr = spawn_server(AppState::new().with_header_delay(Duration::from_secs(2)));
    let (transport, client) = timed(timeout);

    let fb = Reference::new(&format!("http://{addr}"), Some(client)).unwrap();
    let err = fb.value("").unwrap_err();
    assert!(
        matches!(err, Error::Timeout { phase: Phase::AwaitingHeaders, .. }),
        "got {err:?}"
    );
    assert!(err.is_timeout());

    // Header budget is what dialing left over: positive and below the total.
    let attempt = transport.last_attempt().unwrap();
    assert_eq!(attempt.phase, Phase::TimedOut);
    match attempt.header_deadline {
        HeaderDeadline::Remaining(left) => {
            assert!(left > Duration::ZERO);
            assert!(left < timeout);
            assert_eq!(left + attempt.dial_elapsed, timeout);
        }
        other => panic!("expected a remaining header budget, got {other:?}"),
    }
}

#[test]
fn header_timeout_closes_the_connection() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    // Accepts, reads the request, never answers, and returns once the client
    // hangs up. A read timeout here means the socket was left open.
    let server = thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).unwrap();
            if n == 0 {
                return received;
            }
            received.extend_from_slice(&buf[..n]);
        }
    });
    let (transport, client) = timed(Duration::from_millis(200));

    let fb = Reference::new(&format!("http://{addr}"), Some(client)).unwrap();
    let err = fb.value("").unwrap_err();
    assert!(
        matches!(err, Error::Timeout { phase: Phase::AwaitingHeaders, .. }),
        "got {err:?}"
    );

    // The transport is still alive, yet the server already saw end of stream.
    let received = server.join().unwrap();
    assert!(received.starts_with(b"GET / HTTP/1.1\r\n"));
    assert_eq!(transport.last_attempt().unwrap().phase, Phase::TimedOut);
}

#[test]
fn unreachable_host_times_out_while_dialing() {
    let (transport, client) = timed(Duration::from_micros(1));

    let fb = Reference::new("http://dialtimeouterr.or/", Some(client)).unwrap();
    let err = fb.value("").unwrap_err();
    assert!(
        matches!(err, Error::Timeout { phase: Phase::Dialing, .. }),
        "got {err:?}"
    );

    // Dialing consumed the whole budget, so nothing is left for headers.
    let attempt = transport.last_attempt().unwrap();
    assert_eq!(attempt.phase, Phase::TimedOut);
    assert!(matches!(attempt.header_deadline, HeaderDeadline::Exhausted(_)));
    assert!(attempt.header_deadline.remaining().is_none());
}

#[test]
fn fast_server_succeeds_within_budget() {
    let addr = spawn_server(AppState::new());
    let (transport, client) = timed(Duration::from_secs(5));

    let fb = Reference::new(&format!("http://{addr}"), Some(client)).unwrap();
    assert!(fb.value("").unwrap().is_null());

    let attempt = transport.last_attempt().unwrap();
    assert_eq!(attempt.phase, Phase::HeadersReceived);
    assert!(attempt.header_deadline.remaining().is_some());
}

#[test]
fn refused_connection_is_not_a_timeout() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let (_, client) = timed(Duration::from_secs(5));

    let fb = Reference::new(&format!("http://{addr}"), Some(client)).unwrap();
    let err = fb.value("").unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {err:?}");
    assert!(!err.is_timeout());
}

#[test]
fn children_share_the_parent_transport() {
    let addr = spawn_server(AppState::new().with_header_delay(Duration::from_secs(2)));
    let (transport, client) = timed(Duration::from_millis(200));

    let root = Reference::new(&format!("http://{addr}"), Some(client)).unwrap();
    let err = root.child("a").child("b").value("").unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(transport.last_attempt().unwrap().phase, Phase::TimedOut);
}
