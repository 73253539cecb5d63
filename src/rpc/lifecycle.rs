//! Lifecycle controller: starts and stops the transport on link changes.
//!
//! Connectivity callbacks (Wi-Fi / IP events, USB attach) run on foreign
//! contexts, so they only post a [`LinkEvent`] into a bounded
//! `embassy-sync` channel. The owner of the controller drains it with
//! [`LifecycleController::poll_link_events`].
//!
//! ```text
//!  IP_EVENT / WIFI_EVENT ──▶ post_link_event() ──▶ LINK_EVENTS ──▶ poll_link_events()
//!                                                                    │
//!                                               on_link_up ◀─────────┤
//!                                               on_link_down ◀───────┘
//! ```
//!
//! Link-down stops the transport but keeps the registry and all
//! statistics; up/down are idempotent.

use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{error, info, warn};
use serde::Serialize;

use super::dispatcher::{Dispatcher, DispatcherStats};
use super::transport::{Transport, TransportStats};
use crate::error::TransportError;

/// External connectivity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Up,
    Down,
}

/// Link-event queue depth.
pub const LINK_EVENT_DEPTH: usize = 4;

pub type LinkEventQueue = Channel<CriticalSectionRawMutex, LinkEvent, LINK_EVENT_DEPTH>;

/// Process-wide link-event queue fed by connectivity callbacks.
pub static LINK_EVENTS: LinkEventQueue = Channel::new();

/// Post a link event from any context. Returns `false` if the queue is full.
pub fn post_link_event(event: LinkEvent) -> bool {
    if LINK_EVENTS.try_send(event).is_err() {
        warn!("LIFECYCLE: link event queue full, dropping {:?}", event);
        return false;
    }
    true
}

/// Aggregated server statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    pub dispatcher: DispatcherStats,
    pub transport: TransportStats,
    pub link_up: bool,
    pub link_transitions: u32,
}

pub struct LifecycleController<T: Transport> {
    transport: T,
    dispatcher: Arc<Dispatcher>,
    link_up: bool,
    transitions: u32,
}

impl<T: Transport> LifecycleController<T> {
    pub fn new(transport: T, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            transport,
            dispatcher,
            link_up: false,
            transitions: 0,
        }
    }

    /// Link became available: bind the transport to the dispatcher and start
    /// it. A start failure (e.g. bind) is returned; calling again retries.
    pub fn on_link_up(&mut self) -> Result<(), TransportError> {
        if !self.link_up {
            self.link_up = true;
            self.transitions = self.transitions.wrapping_add(1);
            info!("LIFECYCLE: link up");
        }
        if self.transport.is_running() {
            return Ok(());
        }

        self.transport
            .set_message_handler(self.dispatcher.message_handler());
        self.transport.start().inspect_err(|e| {
            error!("LIFECYCLE: transport start failed: {}", e);
        })
    }

    /// Link lost: stop the transport, keeping registry and statistics.
    pub fn on_link_down(&mut self) {
        if self.link_up {
            self.link_up = false;
            self.transitions = self.transitions.wrapping_add(1);
            info!("LIFECYCLE: link down");
        }
        if self.transport.is_running() {
            self.transport.stop();
        }
    }

    pub fn apply(&mut self, event: LinkEvent) -> Result<(), TransportError> {
        match event {
            LinkEvent::Up => self.on_link_up(),
            LinkEvent::Down => {
                self.on_link_down();
                Ok(())
            }
        }
    }

    /// Apply every event waiting in `queue`; returns how many were applied.
    /// Start failures are logged and left for the next `Up` to retry.
    pub fn drain_events(&mut self, queue: &LinkEventQueue) -> usize {
        let mut applied = 0;
        while let Ok(event) = queue.try_receive() {
            // Failure already logged by on_link_up.
            let _ = self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Drain the process-wide [`LINK_EVENTS`] queue.
    pub fn poll_link_events(&mut self) -> usize {
        self.drain_events(&LINK_EVENTS)
    }

    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            dispatcher: self.dispatcher.stats(),
            transport: self.transport.stats(),
            link_up: self.link_up,
            link_transitions: self.transitions,
        }
    }

    pub fn reset_stats(&self) {
        self.dispatcher.reset_stats();
        self.transport.reset_stats();
    }
}

impl<T: Transport> Drop for LifecycleController<T> {
    fn drop(&mut self) {
        if self.transport.is_running() {
            self.transport.stop();
        }
    }
}
