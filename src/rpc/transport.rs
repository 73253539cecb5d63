//! Transport abstraction: owns raw byte I/O and connection lifecycle.
//!
//! Concrete implementations:
//! - [`SerialTransport`](super::serial::SerialTransport): one framed link
//!   (UART / USB-CDC), RX unit + TX unit + bounded TX queue
//! - [`SocketTransport`](super::socket::SocketTransport): TCP listener with
//!   a fixed client-slot table and one receive unit per client
//!
//! Transports know nothing about JSON-RPC. Every complete inbound message
//! is handed to the [`MessageHandler`]; whatever it returns is written back
//! on the same connection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;

use crate::error::{LinkError, TransportError};

/// One complete inbound message.
#[derive(Debug, Clone, Copy)]
pub struct InboundMessage<'a> {
    /// Connection the bytes arrived on (0 for single-link transports).
    pub conn_id: u32,
    pub payload: &'a [u8],
    /// Additive checksum computed on receipt.
    pub checksum: u16,
}

/// Callback invoked for every inbound message; returns the reply bytes.
pub type MessageHandler = Arc<dyn Fn(InboundMessage<'_>) -> Option<Vec<u8>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransportStatus {
    Stopped,
    Starting,
    /// Running and accepting traffic.
    Listening,
    /// Start failed; call `start` again to retry.
    Error,
}

/// Transport counters. Monotonic until `reset_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub total_connections: u32,
    pub active_connections: u32,
    pub messages_received: u32,
    pub messages_sent: u32,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub errors: u32,
    pub buffer_overruns: u32,
    pub framing_errors: u32,
    pub uptime_ms: u64,
}

/// Common contract for all transports.
pub trait Transport: Send {
    /// Open the link / bind the listener and spawn the execution units.
    /// Starting a running transport is a no-op.
    fn start(&mut self) -> Result<(), TransportError>;

    /// Stop all execution units and close every connection. Idempotent.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    fn status(&self) -> TransportStatus;

    /// Send `data` to one connection.
    fn send(&self, conn_id: u32, data: &[u8]) -> Result<(), TransportError>;

    /// Install the inbound message callback. Takes effect on the next start.
    fn set_message_handler(&mut self, handler: MessageHandler);

    fn stats(&self) -> TransportStats;

    /// Zero counters (except `active_connections`) and restart uptime.
    fn reset_stats(&self);
}

// ── Byte links ───────────────────────────────────────────────

/// Receive half of a byte link.
pub trait LinkRx: Send + 'static {
    /// Read up to `buf.len()` bytes, waiting at most the link's poll
    /// interval. Returns `Ok(0)` when nothing arrived in time.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;
}

/// Transmit half of a byte link.
pub trait LinkTx: Send + 'static {
    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError>;
    fn flush(&mut self) -> Result<(), LinkError>;
}

// ── Shared statistics ────────────────────────────────────────

/// Mutex-guarded transport counters shared by all execution units.
pub struct StatsCell {
    inner: Mutex<(TransportStats, Instant)>,
}

impl StatsCell {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new((TransportStats::default(), Instant::now())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, (TransportStats, Instant)> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update(&self, f: impl FnOnce(&mut TransportStats)) {
        f(&mut self.lock().0);
    }

    pub fn snapshot(&self) -> TransportStats {
        let guard = self.lock();
        TransportStats {
            uptime_ms: guard.1.elapsed().as_millis() as u64,
            ..guard.0
        }
    }

    pub fn reset(&self) {
        let mut guard = self.lock();
        let active = guard.0.active_connections;
        guard.0 = TransportStats {
            active_connections: active,
            ..TransportStats::default()
        };
        guard.1 = Instant::now();
    }

    /// Count one inbound message of `len` bytes.
    pub fn record_rx(&self, len: usize) {
        self.update(|s| {
            s.messages_received = s.messages_received.wrapping_add(1);
            s.bytes_received = s.bytes_received.wrapping_add(len as u64);
        });
    }

    /// Count one outbound message of `len` bytes.
    pub fn record_tx(&self, len: usize) {
        self.update(|s| {
            s.messages_sent = s.messages_sent.wrapping_add(1);
            s.bytes_sent = s.bytes_sent.wrapping_add(len as u64);
        });
    }

    pub fn record_error(&self) {
        self.update(|s| s.errors = s.errors.wrapping_add(1));
    }
}

impl Default for StatsCell {
    fn default() -> Self {
        Self::new()
    }
}
