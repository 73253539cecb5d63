//! Integration tests for the socket transport over loopback TCP.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use serde_json::Value;
use tinymcp::config::SocketConfig;
use tinymcp::rpc::codec::{self, FrameDecoder};
use tinymcp::rpc::socket::SocketTransport;
use tinymcp::rpc::transport::Transport;

use crate::mock_link::{dispatcher, loopback, wait_for};

fn server(config: SocketConfig) -> SocketTransport {
    let mut t = SocketTransport::new(config);
    t.set_message_handler(dispatcher().message_handler());
    t.start().unwrap();
    t
}

fn connect(t: &SocketTransport) -> TcpStream {
    let s = TcpStream::connect(("127.0.0.1", t.port())).unwrap();
    s.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    s
}

/// Send one message and read the newline-terminated reply.
fn roundtrip(stream: &mut TcpStream, raw: &str) -> Value {
    stream.write_all(raw.as_bytes()).unwrap();
    let mut line = String::new();
    BufReader::new(stream.try_clone().unwrap())
        .read_line(&mut line)
        .unwrap();
    assert!(line.ends_with('\n'));
    serde_json::from_str(line.trim_end()).unwrap()
}

#[test]
fn echo_over_tcp() {
    let mut t = server(loopback(4));
    let mut c = connect(&t);
    let reply = roundtrip(
        &mut c,
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hello"}}}"#,
    );
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["message"], "hello");
    t.stop();
}

#[test]
fn parse_error_reply_has_null_id() {
    let mut t = server(loopback(4));
    let mut c = connect(&t);
    let reply = roundtrip(&mut c, "{{{{");
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["error"]["code"], -32700);
    t.stop();
}

#[test]
fn replies_follow_request_order_per_client() {
    let mut t = server(loopback(4));
    let mut c = connect(&t);
    for id in 1..=5 {
        let reply = roundtrip(&mut c, &format!(r#"{{"jsonrpc":"2.0","id":{id},"method":"ping"}}"#));
        assert_eq!(reply["id"], id);
    }
    t.stop();
}

#[test]
fn client_beyond_capacity_is_rejected() {
    let mut t = server(loopback(4));
    let clients: Vec<TcpStream> = (0..4).map(|_| connect(&t)).collect();
    assert!(wait_for(|| t.client_count() == 4));

    let mut fifth = connect(&t);
    let mut buf = [0u8; 8];
    // Closed by the server without a reply.
    assert_eq!(fifth.read(&mut buf).unwrap_or(0), 0);
    assert!(wait_for(|| t.stats().errors == 1));

    let s = t.stats();
    assert_eq!(s.active_connections, 4);
    assert_eq!(s.total_connections, 4);

    // The admitted clients keep working.
    let mut clients = clients;
    for (i, c) in clients.iter_mut().enumerate() {
        let reply = roundtrip(c, &format!(r#"{{"jsonrpc":"2.0","id":{i},"method":"ping"}}"#));
        assert_eq!(reply["id"], i);
        assert_eq!(reply["result"], "pong");
    }
    assert_eq!(t.stats().errors, 1);
    drop(clients);
    assert!(wait_for(|| t.client_count() == 0));
    t.stop();
}

#[test]
fn slot_is_reused_after_disconnect_with_new_id() {
    let mut t = server(loopback(1));
    let first = connect(&t);
    assert!(wait_for(|| t.client_count() == 1));
    let first_id = t.clients()[0].id;
    drop(first);
    assert!(wait_for(|| t.client_count() == 0));

    let _second = connect(&t);
    assert!(wait_for(|| t.client_count() == 1));
    assert!(t.clients()[0].id > first_id);
    assert_eq!(t.stats().active_connections, 1);
    t.stop();
}

#[test]
fn send_reaches_a_specific_client() {
    let mut t = server(loopback(4));
    let c = connect(&t);
    assert!(wait_for(|| t.client_count() == 1));
    let id = t.clients()[0].id;
    t.send(id, b"{\"jsonrpc\":\"2.0\",\"method\":\"notify\"}").unwrap();

    let mut line = String::new();
    BufReader::new(c).read_line(&mut line).unwrap();
    assert_eq!(line, "{\"jsonrpc\":\"2.0\",\"method\":\"notify\"}\n");
    t.stop();
}

#[test]
fn framed_mode_round_trip() {
    let mut t = server(SocketConfig {
        framing: true,
        ..loopback(4)
    });
    let mut c = connect(&t);
    c.write_all(&codec::frame(br#"{"jsonrpc":"2.0","id":8,"method":"ping"}"#))
        .unwrap();

    let mut decoder = FrameDecoder::new(1024);
    let mut reply = None;
    let mut buf = [0u8; 256];
    while reply.is_none() {
        let n = c.read(&mut buf).unwrap();
        assert_ne!(n, 0, "server closed before replying");
        decoder.feed_slice(&buf[..n], |p| reply = Some(p.to_vec()));
    }
    let reply: Value = serde_json::from_slice(&reply.unwrap()).unwrap();
    assert_eq!(reply["id"], 8);
    assert_eq!(reply["result"], "pong");
    t.stop();
}

#[test]
fn stop_disconnects_clients() {
    let mut t = server(loopback(4));
    let mut c = connect(&t);
    assert!(wait_for(|| t.client_count() == 1));
    t.stop();
    let mut buf = [0u8; 8];
    assert_eq!(c.read(&mut buf).unwrap_or(0), 0);
    assert_eq!(t.send(1, b"x"), Err(tinymcp::error::TransportError::NotRunning));
}

#[test]
fn broadcast_reaches_every_client() {
    let mut t = server(loopback(4));
    let a = connect(&t);
    let b = connect(&t);
    assert!(wait_for(|| t.client_count() == 2));

    assert_eq!(t.broadcast(b"{\"jsonrpc\":\"2.0\",\"method\":\"tick\"}"), 2);
    for c in [a, b] {
        let mut line = String::new();
        BufReader::new(c).read_line(&mut line).unwrap();
        assert_eq!(line, "{\"jsonrpc\":\"2.0\",\"method\":\"tick\"}\n");
    }
    assert_eq!(t.stats().messages_sent, 2);
    t.stop();
}
