//! Multi-client socket transport.
//!
//! ```text
//!                 ┌──────────────────┐
//!  TcpListener ──▶│  Accept unit     │── table full ──▶ close + errors++
//!  (non-block,    │  50 ms poll      │
//!   poll)         └────────┬─────────┘
//!                          │ free-slot scan, id = next_id++
//!            ┌─────────────┼─────────────┐
//!            ▼             ▼             ▼
//!       ┌─────────┐   ┌─────────┐   ┌─────────┐
//!       │ client 1│   │ client 2│   │ client n│   one receive unit each:
//!       │ read →  │   │ read →  │   │ read →  │   read → handler → write,
//!       │ handler │   │ handler │   │ handler │   strictly in receipt order
//!       └─────────┘   └─────────┘   └─────────┘
//! ```
//!
//! The slot table and the counters sit behind mutexes that are only held
//! for the table/counter update; all socket I/O happens outside them.
//! Each connection has its own write lock so replies and `send()` calls
//! never interleave bytes.
//!
//! Without framing, every read is treated as one whole message and replies
//! are terminated with `'\n'`. With framing, reads are fed through a
//! per-connection [`FrameDecoder`] and replies are framed.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::Serialize;

use super::codec::{self, FrameDecoder};
use super::transport::{
    InboundMessage, MessageHandler, StatsCell, Transport, TransportStats, TransportStatus,
};
use crate::config::SocketConfig;
use crate::drivers::task_pin::{ACCEPT_TASK, CLIENT_TASK, spawn_task};
use crate::error::{LinkError, TransportError};

/// Client slot table capacity; `max_clients` may not exceed it.
pub const MAX_CLIENT_SLOTS: usize = 8;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Connections ──────────────────────────────────────────────

/// One accepted socket, shared by its receive unit and `send()`.
struct Connection {
    stream: TcpStream,
    write_lock: Mutex<()>,
}

impl Connection {
    fn write_message(&self, bytes: &[u8]) -> io::Result<()> {
        let _guard = lock(&self.write_lock);
        let mut w = &self.stream;
        w.write_all(bytes)?;
        w.flush()
    }

    fn close(&self) {
        // Unblocks the receive unit; errors mean it is already closed.
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

struct ClientSlot {
    id: u32,
    peer: SocketAddr,
    conn: Arc<Connection>,
    connected_at: Instant,
    messages_in: u32,
    messages_out: u32,
}

/// Snapshot of one connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub id: u32,
    pub peer: SocketAddr,
    pub connected_ms: u64,
    pub messages_in: u32,
    pub messages_out: u32,
}

struct SlotTable {
    slots: heapless::Vec<Option<ClientSlot>, MAX_CLIENT_SLOTS>,
    next_id: u32,
}

impl SlotTable {
    fn new(max_clients: usize) -> Self {
        let mut slots = heapless::Vec::new();
        for _ in 0..max_clients.min(MAX_CLIENT_SLOTS) {
            // Capacity checked by the bound above.
            let _ = slots.push(None);
        }
        Self { slots, next_id: 1 }
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    fn get_mut(&mut self, id: u32) -> Option<&mut ClientSlot> {
        self.slots.iter_mut().flatten().find(|s| s.id == id)
    }

    fn remove(&mut self, id: u32) -> Option<ClientSlot> {
        self.slots
            .iter_mut()
            .find(|s| matches!(s, Some(c) if c.id == id))
            .and_then(Option::take)
    }

    fn occupied(&self) -> impl Iterator<Item = &ClientSlot> {
        self.slots.iter().flatten()
    }
}

/// State shared between the transport handle and its execution units.
struct Shared {
    config: SocketConfig,
    running: AtomicBool,
    table: Mutex<SlotTable>,
    stats: StatsCell,
}

impl Shared {
    fn encode(&self, payload: &[u8]) -> Vec<u8> {
        if self.config.framing {
            codec::frame(payload)
        } else {
            let mut out = Vec::with_capacity(payload.len() + 1);
            out.extend_from_slice(payload);
            out.push(b'\n');
            out
        }
    }

    fn connection(&self, id: u32) -> Option<Arc<Connection>> {
        lock(&self.table)
            .occupied()
            .find(|s| s.id == id)
            .map(|s| Arc::clone(&s.conn))
    }

    fn count_out(&self, id: u32, len: usize) {
        if let Some(slot) = lock(&self.table).get_mut(id) {
            slot.messages_out = slot.messages_out.wrapping_add(1);
        }
        self.stats.record_tx(len);
    }
}

// ── Transport ────────────────────────────────────────────────

pub struct SocketTransport {
    shared: Arc<Shared>,
    handler: Option<MessageHandler>,
    status: TransportStatus,
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
}

impl SocketTransport {
    pub fn new(config: SocketConfig) -> Self {
        let table = SlotTable::new(config.max_clients);
        Self {
            shared: Arc::new(Shared {
                config,
                running: AtomicBool::new(false),
                table: Mutex::new(table),
                stats: StatsCell::new(),
            }),
            handler: None,
            status: TransportStatus::Stopped,
            local_addr: None,
            accept_task: None,
        }
    }

    pub fn config(&self) -> &SocketConfig {
        &self.shared.config
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Actual listen port (differs from the configured one when it was 0).
    pub fn port(&self) -> u16 {
        self.local_addr
            .map_or(self.shared.config.port, |a| a.port())
    }

    pub fn client_count(&self) -> usize {
        lock(&self.shared.table).occupied().count()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        lock(&self.shared.table)
            .occupied()
            .map(|s| ClientInfo {
                id: s.id,
                peer: s.peer,
                connected_ms: s.connected_at.elapsed().as_millis() as u64,
                messages_in: s.messages_in,
                messages_out: s.messages_out,
            })
            .collect()
    }

    /// Send `data` to every connected client; returns how many got it.
    pub fn broadcast(&self, data: &[u8]) -> usize {
        let ids: Vec<u32> = lock(&self.shared.table).occupied().map(|s| s.id).collect();
        ids.into_iter()
            .filter(|&id| self.send(id, data).is_ok())
            .count()
    }
}

impl Transport for SocketTransport {
    fn start(&mut self) -> Result<(), TransportError> {
        if self.shared.running.load(Ordering::Acquire) {
            return Ok(());
        }
        let config = &self.shared.config;
        if let Err(e) = config.validate() {
            self.status = TransportStatus::Error;
            return Err(TransportError::Bind(e.to_string()));
        }
        self.status = TransportStatus::Starting;

        let listener = TcpListener::bind((config.bind_addr.as_str(), config.port))
            .and_then(|l| l.set_nonblocking(true).map(|()| l))
            .map_err(|e| {
                error!("SOCK: bind {}:{} failed: {}", config.bind_addr, config.port, e);
                TransportError::Bind(format!("{}:{}: {e}", config.bind_addr, config.port))
            });
        let listener = match listener {
            Ok(l) => l,
            Err(e) => {
                self.shared.stats.record_error();
                self.status = TransportStatus::Error;
                return Err(e);
            }
        };
        self.local_addr = listener.local_addr().ok();

        *lock(&self.shared.table) = SlotTable::new(config.max_clients);
        self.shared.running.store(true, Ordering::Release);

        let accept = AcceptUnit {
            listener,
            shared: Arc::clone(&self.shared),
            handler: self.handler.clone(),
            workers: Vec::new(),
        };
        match spawn_task(ACCEPT_TASK, move || accept.run()) {
            Ok(h) => self.accept_task = Some(h),
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                self.shared.stats.record_error();
                self.status = TransportStatus::Error;
                self.local_addr = None;
                return Err(TransportError::Spawn(e.to_string()));
            }
        }

        self.status = TransportStatus::Listening;
        info!(
            "SOCK: listening on port {} (max {} clients, framing {})",
            self.port(),
            self.shared.config.max_clients,
            if self.shared.config.framing { "on" } else { "off" }
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(h) = self.accept_task.take() {
            if h.join().is_err() {
                error!("SOCK: accept unit panicked");
            }
            info!("SOCK: stopped");
        }
        self.local_addr = None;
        self.status = TransportStatus::Stopped;
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn status(&self) -> TransportStatus {
        self.status
    }

    fn send(&self, conn_id: u32, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_running() {
            return Err(TransportError::NotRunning);
        }
        let max = self.shared.config.buffer_size;
        if data.len() > max {
            return Err(TransportError::MessageTooLarge {
                len: data.len(),
                max,
            });
        }
        let conn = self
            .shared
            .connection(conn_id)
            .ok_or(TransportError::UnknownConnection(conn_id))?;

        let bytes = self.shared.encode(data);
        conn.write_message(&bytes).map_err(|e| {
            warn!("SOCK[{}]: send failed: {}", conn_id, e);
            self.shared.stats.record_error();
            TransportError::Link(LinkError::from(e))
        })?;
        self.shared.count_out(conn_id, bytes.len());
        Ok(())
    }

    fn set_message_handler(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }

    fn stats(&self) -> TransportStats {
        self.shared.stats.snapshot()
    }

    fn reset_stats(&self) {
        self.shared.stats.reset();
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Accept unit ──────────────────────────────────────────────

struct AcceptUnit {
    listener: TcpListener,
    shared: Arc<Shared>,
    handler: Option<MessageHandler>,
    workers: Vec<JoinHandle<()>>,
}

impl AcceptUnit {
    fn run(mut self) {
        let poll = Duration::from_millis(self.shared.config.accept_poll_ms.max(1));

        while self.shared.running.load(Ordering::Acquire) {
            self.workers.retain(|h| !h.is_finished());
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::sleep(poll),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("SOCK: accept failed: {}", e);
                    self.shared.stats.record_error();
                    std::thread::sleep(poll);
                }
            }
        }

        // Close every connection so the receive units observe EOF, then join.
        let conns: Vec<Arc<Connection>> = lock(&self.shared.table)
            .occupied()
            .map(|s| Arc::clone(&s.conn))
            .collect();
        for conn in conns {
            conn.close();
        }
        for h in self.workers.drain(..) {
            if h.join().is_err() {
                error!("SOCK: client unit panicked");
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        let config = &self.shared.config;
        let setup = stream
            .set_nonblocking(false)
            .and_then(|()| {
                stream.set_read_timeout(Some(Duration::from_millis(config.recv_timeout_ms.max(1))))
            })
            .and_then(|()| stream.set_nodelay(true));
        if let Err(e) = setup {
            warn!("SOCK: socket setup for {} failed: {}", peer, e);
            self.shared.stats.record_error();
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }

        let conn = Arc::new(Connection {
            stream,
            write_lock: Mutex::new(()),
        });

        let id = {
            let mut table = lock(&self.shared.table);
            match table.free_slot() {
                Some(idx) => {
                    let id = table.alloc_id();
                    table.slots[idx] = Some(ClientSlot {
                        id,
                        peer,
                        conn: Arc::clone(&conn),
                        connected_at: Instant::now(),
                        messages_in: 0,
                        messages_out: 0,
                    });
                    Some(id)
                }
                None => None,
            }
        };
        let Some(id) = id else {
            warn!(
                "SOCK: client table full ({}), rejecting {}",
                config.max_clients, peer
            );
            conn.close();
            self.shared.stats.record_error();
            return;
        };

        self.shared.stats.update(|s| {
            s.total_connections = s.total_connections.wrapping_add(1);
            s.active_connections = s.active_connections.wrapping_add(1);
        });
        info!("SOCK[{}]: connected from {}", id, peer);

        let unit = ClientUnit {
            id,
            conn,
            shared: Arc::clone(&self.shared),
            handler: self.handler.clone(),
        };
        match spawn_task(CLIENT_TASK, move || unit.run()) {
            Ok(h) => self.workers.push(h),
            Err(e) => {
                error!("SOCK[{}]: spawn failed: {}", id, e);
                if let Some(slot) = lock(&self.shared.table).remove(id) {
                    slot.conn.close();
                }
                self.shared.stats.update(|s| {
                    s.active_connections = s.active_connections.saturating_sub(1);
                    s.errors = s.errors.wrapping_add(1);
                });
            }
        }
    }
}

// ── Client receive unit ──────────────────────────────────────

struct ClientUnit {
    id: u32,
    conn: Arc<Connection>,
    shared: Arc<Shared>,
    handler: Option<MessageHandler>,
}

impl ClientUnit {
    fn run(self) {
        let config = &self.shared.config;
        let mut buf = vec![0u8; config.buffer_size];
        let mut decoder = config.framing.then(|| FrameDecoder::new(config.buffer_size));
        let mut seen_overruns = 0;

        while self.shared.running.load(Ordering::Acquire) {
            let n = match (&self.conn.stream).read(&mut buf) {
                Ok(0) => {
                    info!("SOCK[{}]: peer closed", self.id);
                    break;
                }
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    if self.shared.running.load(Ordering::Acquire) {
                        warn!("SOCK[{}]: read failed: {}", self.id, e);
                        self.shared.stats.record_error();
                    }
                    break;
                }
            };
            self.shared
                .stats
                .update(|s| s.bytes_received = s.bytes_received.wrapping_add(n as u64));

            let alive = match decoder.as_mut() {
                Some(decoder) => {
                    let mut alive = true;
                    decoder.feed_slice(&buf[..n], |payload| {
                        if alive {
                            alive = self.process(payload);
                        }
                    });
                    let overruns = decoder.overruns();
                    if overruns != seen_overruns {
                        warn!("SOCK[{}]: frame exceeded {} bytes", self.id, config.buffer_size);
                        self.shared.stats.update(|s| {
                            s.buffer_overruns = s
                                .buffer_overruns
                                .wrapping_add(overruns.wrapping_sub(seen_overruns));
                        });
                        seen_overruns = overruns;
                    }
                    alive
                }
                None => self.process(&buf[..n]),
            };
            if !alive {
                break;
            }
        }

        self.cleanup();
    }

    /// Handle one complete message; `false` when the connection broke.
    fn process(&self, payload: &[u8]) -> bool {
        self.shared.stats.update(|s| {
            s.messages_received = s.messages_received.wrapping_add(1);
        });
        if let Some(slot) = lock(&self.shared.table).get_mut(self.id) {
            slot.messages_in = slot.messages_in.wrapping_add(1);
        }

        let Some(handler) = &self.handler else {
            warn!("SOCK[{}]: no handler, dropping message", self.id);
            return true;
        };
        let reply = handler(InboundMessage {
            conn_id: self.id,
            payload,
            checksum: codec::checksum(payload),
        });
        let Some(reply) = reply else {
            return true;
        };

        let bytes = self.shared.encode(&reply);
        match self.conn.write_message(&bytes) {
            Ok(()) => {
                self.shared.count_out(self.id, bytes.len());
                debug!("SOCK[{}]: replied {} bytes", self.id, bytes.len());
                true
            }
            Err(e) => {
                warn!("SOCK[{}]: write failed: {}", self.id, e);
                self.shared.stats.record_error();
                false
            }
        }
    }

    fn cleanup(&self) {
        self.conn.close();
        if lock(&self.shared.table).remove(self.id).is_some() {
            self.shared.stats.update(|s| {
                s.active_connections = s.active_connections.saturating_sub(1);
            });
        }
        info!("SOCK[{}]: disconnected", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ephemeral() -> SocketConfig {
        SocketConfig {
            bind_addr: "127.0.0.1".into(),
            port: 0,
            accept_poll_ms: 5,
            recv_timeout_ms: 20,
            ..SocketConfig::default()
        }
    }

    #[test]
    fn slot_table_first_free_and_monotonic_ids() {
        let mut t = SlotTable::new(2);
        assert_eq!(t.free_slot(), Some(0));
        assert_eq!(t.alloc_id(), 1);
        assert_eq!(t.alloc_id(), 2);
        assert_eq!(t.slots.len(), 2);
    }

    #[test]
    fn slot_table_clamps_to_capacity() {
        let t = SlotTable::new(MAX_CLIENT_SLOTS + 4);
        assert_eq!(t.slots.len(), MAX_CLIENT_SLOTS);
    }

    #[test]
    fn id_allocation_skips_zero_on_wrap() {
        let mut t = SlotTable::new(1);
        t.next_id = u32::MAX;
        assert_eq!(t.alloc_id(), u32::MAX);
        assert_eq!(t.alloc_id(), 1);
    }

    #[test]
    fn start_binds_and_stop_releases() {
        let mut t = SocketTransport::new(ephemeral());
        t.start().unwrap();
        assert!(t.is_running());
        assert_eq!(t.status(), TransportStatus::Listening);
        assert_ne!(t.port(), 0);
        t.start().unwrap();
        t.stop();
        assert!(!t.is_running());
        assert_eq!(t.local_addr(), None);
        t.stop();
        assert_eq!(t.status(), TransportStatus::Stopped);
    }

    #[test]
    fn send_to_unknown_client_fails() {
        let mut t = SocketTransport::new(ephemeral());
        assert_eq!(t.send(1, b"x"), Err(TransportError::NotRunning));
        t.start().unwrap();
        assert_eq!(t.send(42, b"x"), Err(TransportError::UnknownConnection(42)));
        t.stop();
    }

    #[test]
    fn invalid_config_refuses_to_start() {
        let mut t = SocketTransport::new(SocketConfig {
            max_clients: 0,
            ..ephemeral()
        });
        assert!(matches!(t.start(), Err(TransportError::Bind(_))));
        assert_eq!(t.status(), TransportStatus::Error);
    }

    #[test]
    fn encode_appends_newline_without_framing() {
        let t = SocketTransport::new(ephemeral());
        assert_eq!(t.shared.encode(b"{}"), b"{}\n");
        let t = SocketTransport::new(SocketConfig {
            framing: true,
            ..ephemeral()
        });
        assert_eq!(t.shared.encode(b"{}"), codec::frame(b"{}"));
    }
}
