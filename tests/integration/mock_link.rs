//! Shared fixtures: an in-memory serial wire and a ready dispatcher.
//!
//! The wire records every byte the transport writes so tests can assert
//! on the exact framed output.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tinymcp::config::{ServerConfig, SocketConfig};
use tinymcp::error::LinkError;
use tinymcp::rpc::codec::FrameDecoder;
use tinymcp::rpc::dispatcher::Dispatcher;
use tinymcp::rpc::registry::ToolRegistry;
use tinymcp::rpc::transport::{LinkRx, LinkTx};
use tinymcp::tools;

// ── MockWire ──────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockWire {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    outbound: Arc<Mutex<Vec<u8>>>,
    closed: Arc<Mutex<bool>>,
}

#[allow(dead_code)]
impl MockWire {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes arriving from the host side.
    pub fn push(&self, bytes: &[u8]) {
        self.inbound.lock().unwrap().extend(bytes.iter().copied());
    }

    /// Everything the device wrote so far.
    pub fn written(&self) -> Vec<u8> {
        self.outbound.lock().unwrap().clone()
    }

    /// Decode the written bytes into frame payloads.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        let mut decoder = FrameDecoder::new(4096);
        let mut out = Vec::new();
        decoder.feed_slice(&self.written(), |p| out.push(p.to_vec()));
        out
    }

    pub fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }

    pub fn reopen(&self) {
        *self.closed.lock().unwrap() = false;
    }

    pub fn halves(&self) -> (MockRx, MockTx) {
        (MockRx(self.clone()), MockTx(self.clone()))
    }
}

pub struct MockRx(MockWire);

pub struct MockTx(MockWire);

impl LinkRx for MockRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        if *self.0.closed.lock().unwrap() {
            return Err(LinkError::Closed);
        }
        let mut q = self.0.inbound.lock().unwrap();
        if q.is_empty() {
            drop(q);
            std::thread::sleep(Duration::from_millis(2));
            return Ok(0);
        }
        let n = buf.len().min(q.len());
        for (slot, b) in buf.iter_mut().zip(q.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

impl LinkTx for MockTx {
    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.0.outbound.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

// ── Fixtures ─────────────────────────────────────────────────

/// Dispatcher with the hardware-independent built-in tools.
pub fn dispatcher() -> Arc<Dispatcher> {
    let config = ServerConfig::default();
    let mut registry = ToolRegistry::new();
    tools::register_builtin(&mut registry, &config).unwrap();
    Arc::new(Dispatcher::new(config, registry))
}

/// Loopback listener on an OS-assigned port with fast polling.
#[allow(dead_code)]
pub fn loopback(max_clients: usize) -> SocketConfig {
    SocketConfig {
        bind_addr: "127.0.0.1".into(),
        port: 0,
        max_clients,
        accept_poll_ms: 5,
        recv_timeout_ms: 20,
        ..SocketConfig::default()
    }
}

/// Poll `cond` for up to two seconds.
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
