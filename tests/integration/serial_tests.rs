//! Integration tests for the serial transport over an in-memory wire.

use serde_json::Value;
use tinymcp::config::SerialConfig;
use tinymcp::rpc::codec;
use tinymcp::rpc::lifecycle::LifecycleController;
use tinymcp::rpc::serial::SerialTransport;
use tinymcp::rpc::transport::{Transport, TransportStatus};

use crate::mock_link::{MockRx, MockTx, MockWire, dispatcher, wait_for};

fn serial(wire: &MockWire) -> SerialTransport<MockRx, MockTx> {
    let (rx, tx) = wire.halves();
    let mut t = SerialTransport::new(SerialConfig::default(), rx, tx);
    t.set_message_handler(dispatcher().message_handler());
    t
}

#[test]
fn framed_ping_gets_framed_pong() {
    let wire = MockWire::new();
    let mut t = serial(&wire);
    t.start().unwrap();

    wire.push(&codec::frame(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#));
    assert!(wait_for(|| wire.frames().len() == 1));
    t.stop();

    let reply: Value = serde_json::from_slice(&wire.frames()[0]).unwrap();
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"], "pong");
}

#[test]
fn frames_split_across_reads_and_noise_between() {
    let wire = MockWire::new();
    let mut t = serial(&wire);
    t.start().unwrap();

    let a = codec::frame(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
    let b = codec::frame(br#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#);
    wire.push(&a[..5]);
    std::thread::sleep(std::time::Duration::from_millis(10));
    wire.push(&a[5..]);
    wire.push(b"line noise");
    wire.push(&b);

    assert!(wait_for(|| wire.frames().len() == 2));
    t.stop();

    let ids: Vec<Value> = wire
        .frames()
        .iter()
        .map(|f| serde_json::from_slice::<Value>(f).unwrap()["id"].clone())
        .collect();
    assert_eq!(ids, [1, 2]);
}

#[test]
fn payload_containing_markers_survives_the_wire() {
    let wire = MockWire::new();
    let mut t = serial(&wire);
    t.start().unwrap();

    // 0x7E / 0x7F / 0x7D are printable (~, DEL, }) and legal inside JSON strings.
    let req = "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/call\",\
               \"params\":{\"name\":\"echo\",\"arguments\":{\"s\":\"~}\u{7f}\"}}}";
    wire.push(&codec::frame(req.as_bytes()));
    assert!(wait_for(|| wire.frames().len() == 1));
    t.stop();

    let reply: Value = serde_json::from_slice(&wire.frames()[0]).unwrap();
    assert_eq!(reply["result"]["s"], "~}\u{7f}");
}

#[test]
fn notifications_produce_no_output() {
    let wire = MockWire::new();
    let mut t = serial(&wire);
    t.start().unwrap();
    wire.push(&codec::frame(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#));
    assert!(wait_for(|| t.stats().messages_received == 1));
    std::thread::sleep(std::time::Duration::from_millis(20));
    t.stop();
    assert!(wire.written().is_empty());
}

#[test]
fn closed_link_reports_down_and_relinks() {
    let wire = MockWire::new();
    let (rx, tx) = wire.halves();
    let mut c = LifecycleController::new(
        SerialTransport::new(SerialConfig::default(), rx, tx),
        dispatcher(),
    );
    c.on_link_up().unwrap();

    wire.close();
    assert!(wait_for(|| !c.transport().is_running()));
    assert_eq!(c.transport().status(), TransportStatus::Error);
    let s = c.stats().transport;
    assert_eq!(s.active_connections, 0);
    assert_eq!(s.errors, 1);

    wire.reopen();
    c.on_link_up().unwrap();
    assert!(c.transport().is_running());
    assert_eq!(c.transport().status(), TransportStatus::Listening);
    assert_eq!(c.stats().transport.total_connections, 2);

    wire.push(&codec::frame(br#"{"jsonrpc":"2.0","id":4,"method":"ping"}"#));
    assert!(wait_for(|| wire.frames().len() == 1));
    let reply: Value = serde_json::from_slice(&wire.frames()[0]).unwrap();
    assert_eq!(reply["id"], 4);
    c.on_link_down();
}

#[test]
fn serial_over_tcp_stream_link() {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    use tinymcp::adapters::stream_link::split_tcp;
    use tinymcp::rpc::codec::FrameDecoder;

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut host = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    host.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let (device, _) = listener.accept().unwrap();

    let (rx, tx) = split_tcp(device, Duration::from_millis(10)).unwrap();
    let mut t = SerialTransport::new(SerialConfig::default(), rx, tx);
    t.set_message_handler(dispatcher().message_handler());
    t.start().unwrap();

    host.write_all(&codec::frame(br#"{"jsonrpc":"2.0","id":12,"method":"ping"}"#))
        .unwrap();
    let mut decoder = FrameDecoder::new(1024);
    let mut reply = None;
    let mut buf = [0u8; 128];
    while reply.is_none() {
        let n = host.read(&mut buf).unwrap();
        assert_ne!(n, 0);
        decoder.feed_slice(&buf[..n], |p| reply = Some(p.to_vec()));
    }
    t.stop();

    let reply: Value = serde_json::from_slice(&reply.unwrap()).unwrap();
    assert_eq!(reply["id"], 12);
    assert_eq!(reply["result"], "pong");
}
