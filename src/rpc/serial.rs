//! Single-link (serial) transport.
//!
//! ```text
//!        LinkRx                                         LinkTx
//!   ┌──────────────┐  frames  ┌────────────┐  replies ┌──────────────┐
//!   │  RX unit     │─────────▶│ Dispatcher │─────────▶│  TX queue    │
//!   │  FrameDecoder│          │ (handler)  │          │  (depth 16)  │
//!   └──────────────┘          └────────────┘          └──────┬───────┘
//!                                                            │ frame()
//!                                                     ┌──────▼───────┐
//!                                                     │  TX unit     │
//!                                                     └──────────────┘
//! ```
//!
//! The RX unit owns the receive half of the link and the frame decoder;
//! the TX unit owns the transmit half and drains a bounded `embassy-sync`
//! channel. Both units hand their link half back when joined so the
//! transport can be restarted after a link-down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::{debug, error, info, warn};

use super::codec::{self, FrameDecoder};
use super::transport::{
    InboundMessage, LinkRx, LinkTx, MessageHandler, StatsCell, Transport, TransportStats,
    TransportStatus,
};
use crate::config::SerialConfig;
use crate::drivers::task_pin::{SERIAL_RX_TASK, SERIAL_TX_TASK, spawn_task};
use crate::error::{LinkError, TransportError};

/// Outbound queue depth.
pub const TX_QUEUE_DEPTH: usize = 16;

/// Connection id used for the single serial link.
pub const SERIAL_CONN_ID: u32 = 0;

const READ_CHUNK: usize = 256;

type TxQueue = Channel<CriticalSectionRawMutex, Vec<u8>, TX_QUEUE_DEPTH>;

/// Enqueue with a bounded wait; `QueueFull` once `timeout` has elapsed.
fn enqueue(queue: &TxQueue, data: Vec<u8>, timeout: Duration) -> Result<(), TransportError> {
    let deadline = Instant::now() + timeout;
    let mut pending = data;
    loop {
        match queue.try_send(pending) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(back)) => {
                if Instant::now() >= deadline {
                    return Err(TransportError::QueueFull);
                }
                pending = back;
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

pub struct SerialTransport<R: LinkRx, W: LinkTx> {
    config: SerialConfig,
    rx: Option<R>,
    tx: Option<W>,
    handler: Option<MessageHandler>,
    queue: Arc<TxQueue>,
    running: Arc<AtomicBool>,
    status: TransportStatus,
    stats: Arc<StatsCell>,
    rx_task: Option<JoinHandle<R>>,
    tx_task: Option<JoinHandle<W>>,
}

impl<R: LinkRx, W: LinkTx> SerialTransport<R, W> {
    pub fn new(config: SerialConfig, rx: R, tx: W) -> Self {
        Self {
            config,
            rx: Some(rx),
            tx: Some(tx),
            handler: None,
            queue: Arc::new(Channel::new()),
            running: Arc::new(AtomicBool::new(false)),
            status: TransportStatus::Stopped,
            stats: Arc::new(StatsCell::new()),
            rx_task: None,
            tx_task: None,
        }
    }

    /// Messages waiting in the transmit queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn spawn_units(&mut self, rx: R, tx: W) -> Result<(), TransportError> {
        let rx_unit = RxUnit {
            link: rx,
            decoder: FrameDecoder::new(self.config.buffer_size),
            handler: self.handler.clone(),
            queue: Arc::clone(&self.queue),
            running: Arc::clone(&self.running),
            stats: Arc::clone(&self.stats),
            send_timeout: Duration::from_millis(self.config.send_timeout_ms),
        };
        self.rx_task = Some(
            spawn_task(SERIAL_RX_TASK, move || rx_unit.run())
                .map_err(|e| TransportError::Spawn(e.to_string()))?,
        );

        let tx_unit = TxUnit {
            link: tx,
            queue: Arc::clone(&self.queue),
            running: Arc::clone(&self.running),
            stats: Arc::clone(&self.stats),
            idle: Duration::from_millis(self.config.tx_poll_ms.max(1)),
        };
        self.tx_task = Some(
            spawn_task(SERIAL_TX_TASK, move || tx_unit.run())
                .map_err(|e| TransportError::Spawn(e.to_string()))?,
        );
        Ok(())
    }

    fn join_units(&mut self) {
        if let Some(h) = self.rx_task.take() {
            match h.join() {
                Ok(link) => self.rx = Some(link),
                Err(_) => error!("SERIAL: RX unit panicked, receive link lost"),
            }
        }
        if let Some(h) = self.tx_task.take() {
            match h.join() {
                Ok(link) => self.tx = Some(link),
                Err(_) => error!("SERIAL: TX unit panicked, transmit link lost"),
            }
        }
    }
}

impl<R: LinkRx, W: LinkTx> Transport for SerialTransport<R, W> {
    fn start(&mut self) -> Result<(), TransportError> {
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }
        // Units left over from a lost link hand their halves back here.
        self.join_units();
        let (Some(rx), Some(tx)) = (self.rx.take(), self.tx.take()) else {
            self.status = TransportStatus::Error;
            return Err(TransportError::Link(LinkError::Closed));
        };

        self.status = TransportStatus::Starting;
        if self.handler.is_none() {
            warn!("SERIAL: starting without a message handler");
        }
        self.queue.clear();
        self.running.store(true, Ordering::Release);

        if let Err(e) = self.spawn_units(rx, tx) {
            error!("SERIAL: start failed: {}", e);
            self.running.store(false, Ordering::Release);
            self.join_units();
            self.status = TransportStatus::Error;
            return Err(e);
        }

        self.stats.update(|s| {
            s.total_connections = s.total_connections.wrapping_add(1);
            s.active_connections = 1;
        });
        self.status = TransportStatus::Listening;
        info!(
            "SERIAL: started ({} baud, {} byte frames)",
            self.config.baud_rate, self.config.buffer_size
        );
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) && self.rx_task.is_none() {
            self.status = TransportStatus::Stopped;
            return;
        }
        self.join_units();
        self.queue.clear();
        self.stats.update(|s| s.active_connections = 0);
        self.status = TransportStatus::Stopped;
        info!("SERIAL: stopped");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn status(&self) -> TransportStatus {
        if self.status == TransportStatus::Listening && !self.is_running() {
            // The RX unit saw the link close.
            return TransportStatus::Error;
        }
        self.status
    }

    fn send(&self, conn_id: u32, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_running() {
            return Err(TransportError::NotRunning);
        }
        if conn_id != SERIAL_CONN_ID {
            return Err(TransportError::UnknownConnection(conn_id));
        }
        if data.len() > self.config.buffer_size {
            return Err(TransportError::MessageTooLarge {
                len: data.len(),
                max: self.config.buffer_size,
            });
        }
        enqueue(
            &self.queue,
            data.to_vec(),
            Duration::from_millis(self.config.send_timeout_ms),
        )
        .inspect_err(|_| {
            warn!("SERIAL: transmit queue full, dropping message");
            self.stats.record_error();
        })
    }

    fn set_message_handler(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }

    fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }

    fn reset_stats(&self) {
        self.stats.reset();
    }
}

impl<R: LinkRx, W: LinkTx> Drop for SerialTransport<R, W> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Execution units ──────────────────────────────────────────

struct RxUnit<R> {
    link: R,
    decoder: FrameDecoder,
    handler: Option<MessageHandler>,
    queue: Arc<TxQueue>,
    running: Arc<AtomicBool>,
    stats: Arc<StatsCell>,
    send_timeout: Duration,
}

impl<R: LinkRx> RxUnit<R> {
    fn run(mut self) -> R {
        let mut buf = [0u8; READ_CHUNK];
        let mut seen = (0u32, 0u32);

        while self.running.load(Ordering::Acquire) {
            let n = match self.link.read(&mut buf) {
                Ok(0) => continue,
                Ok(n) => n,
                Err(LinkError::Closed) => {
                    warn!("SERIAL: link closed, RX unit exiting");
                    self.running.store(false, Ordering::Release);
                    self.stats.update(|s| {
                        s.active_connections = 0;
                        s.errors = s.errors.wrapping_add(1);
                    });
                    break;
                }
                Err(e) => {
                    warn!("SERIAL: read error: {}", e);
                    self.stats.record_error();
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
            };
            self.stats
                .update(|s| s.bytes_received = s.bytes_received.wrapping_add(n as u64));

            let Self {
                decoder,
                handler,
                queue,
                stats,
                send_timeout,
                ..
            } = &mut self;
            decoder.feed_slice(&buf[..n], |payload| {
                stats.update(|s| s.messages_received = s.messages_received.wrapping_add(1));
                debug!("SERIAL: frame of {} bytes", payload.len());
                let Some(handler) = handler else {
                    warn!("SERIAL: no handler, dropping frame");
                    return;
                };
                let msg = InboundMessage {
                    conn_id: SERIAL_CONN_ID,
                    payload,
                    checksum: codec::checksum(payload),
                };
                if let Some(reply) = handler(msg) {
                    if enqueue(queue, reply, *send_timeout).is_err() {
                        warn!("SERIAL: transmit queue full, reply dropped");
                        stats.record_error();
                    }
                }
            });

            let now = (self.decoder.overruns(), self.decoder.framing_errors());
            if now != seen {
                self.stats.update(|s| {
                    s.buffer_overruns = s.buffer_overruns.wrapping_add(now.0.wrapping_sub(seen.0));
                    s.framing_errors = s.framing_errors.wrapping_add(now.1.wrapping_sub(seen.1));
                });
                if now.0 != seen.0 {
                    warn!("SERIAL: frame exceeded {} bytes, discarded", self.decoder.capacity());
                }
                seen = now;
            }
        }
        self.link
    }
}

struct TxUnit<W> {
    link: W,
    queue: Arc<TxQueue>,
    running: Arc<AtomicBool>,
    stats: Arc<StatsCell>,
    idle: Duration,
}

impl<W: LinkTx> TxUnit<W> {
    fn run(mut self) -> W {
        loop {
            match self.queue.try_receive() {
                Ok(payload) => {
                    let framed = codec::frame(&payload);
                    match self.link.write_all(&framed).and_then(|()| self.link.flush()) {
                        Ok(()) => self.stats.record_tx(framed.len()),
                        Err(e) => {
                            warn!("SERIAL: write failed: {}", e);
                            self.stats.record_error();
                        }
                    }
                }
                Err(_) => {
                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    std::thread::sleep(self.idle);
                }
            }
        }
        self.link
    }
}
