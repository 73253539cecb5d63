//! Integration tests for the lifecycle controller driving a real socket
//! transport.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use tinymcp::config::SocketConfig;
use tinymcp::error::TransportError;
use tinymcp::rpc::lifecycle::{LifecycleController, LinkEvent, LinkEventQueue};
use tinymcp::rpc::socket::SocketTransport;
use tinymcp::rpc::transport::{Transport, TransportStatus};

use crate::mock_link::{dispatcher, loopback};

fn ping(port: u16) -> String {
    let mut s = TcpStream::connect(("127.0.0.1", port)).unwrap();
    s.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    s.write_all(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
    let mut line = String::new();
    BufReader::new(s).read_line(&mut line).unwrap();
    line
}

#[test]
fn link_up_serves_and_link_down_stops() {
    let mut c = LifecycleController::new(SocketTransport::new(loopback(4)), dispatcher());
    c.on_link_up().unwrap();
    let port = c.transport().port();
    assert!(ping(port).contains("pong"));

    c.on_link_down();
    assert!(!c.transport().is_running());
    assert_eq!(c.transport().status(), TransportStatus::Stopped);
    assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
    // Dispatcher statistics survive the link drop.
    assert_eq!(c.stats().dispatcher.messages_sent, 1);
}

#[test]
fn bind_failure_surfaces_and_recovers() {
    let blocker = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();
    let config = SocketConfig {
        port,
        ..loopback(4)
    };
    let mut c = LifecycleController::new(SocketTransport::new(config), dispatcher());

    assert!(matches!(c.on_link_up(), Err(TransportError::Bind(_))));
    assert_eq!(c.transport().status(), TransportStatus::Error);
    assert_eq!(c.stats().transport.errors, 1);

    drop(blocker);
    c.on_link_up().unwrap();
    assert!(c.transport().is_running());
    c.on_link_down();
}

#[test]
fn queued_events_replay_in_order() {
    let queue = LinkEventQueue::new();
    let mut c = LifecycleController::new(SocketTransport::new(loopback(4)), dispatcher());
    queue.try_send(LinkEvent::Up).unwrap();
    queue.try_send(LinkEvent::Up).unwrap();
    queue.try_send(LinkEvent::Down).unwrap();
    assert_eq!(c.drain_events(&queue), 3);
    assert!(!c.is_link_up());
    assert!(!c.transport().is_running());
    assert_eq!(c.stats().link_transitions, 2);
}

#[test]
fn restart_after_link_flap() {
    let mut c = LifecycleController::new(SocketTransport::new(loopback(4)), dispatcher());
    c.on_link_up().unwrap();
    c.on_link_down();
    c.on_link_up().unwrap();
    assert!(ping(c.transport().port()).contains("pong"));
    assert_eq!(c.stats().transport.total_connections, 1);
}
