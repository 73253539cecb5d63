//! JSON-RPC dispatcher.
//!
//! Owns the (read-only) tool registry and routes each inbound message:
//!
//! ```text
//!   bytes ─▶ Message::parse ─▶ route(method) ─▶ Message ─▶ serialize ─▶ bytes
//!                 │                 │
//!                 │                 ├─ tools/list   → catalogue
//!                 │                 ├─ tools/call   → Tool::execute
//!                 │                 ├─ initialize / ping / notifications/*
//!                 │                 └─ anything else → -32601
//!                 └─ parse failure → -32700 / -32600
//! ```
//!
//! `handle` runs synchronously on the calling receive thread. The only
//! shared mutable state is the statistics block, guarded by one mutex that
//! is held just for the counter update.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::codec;
use super::message::{ErrorCode, Message, MessageKind, RpcError};
use super::registry::{ResultBuffer, ToolRegistry};
use super::transport::{InboundMessage, MessageHandler};
use crate::config::ServerConfig;

// Built-in method names.
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_PING: &str = "ping";

/// Dispatcher counters. Monotonic until [`Dispatcher::reset_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub messages_received: u32,
    pub messages_sent: u32,
    pub requests_processed: u32,
    /// Error replies produced (including tool failures).
    pub errors: u32,
    pub tools_executed: u32,
    pub parse_errors: u32,
    pub checksum_mismatches: u32,
    pub uptime_ms: u64,
}

struct StatsState {
    counters: DispatcherStats,
    started: Instant,
}

pub struct Dispatcher {
    registry: ToolRegistry,
    config: ServerConfig,
    stats: Mutex<StatsState>,
}

impl Dispatcher {
    pub fn new(config: ServerConfig, registry: ToolRegistry) -> Self {
        info!(
            "RPC: dispatcher '{}' v{} ready with {} tool(s)",
            config.name,
            config.version,
            registry.len()
        );
        Self {
            registry,
            config,
            stats: Mutex::new(StatsState {
                counters: DispatcherStats::default(),
                started: Instant::now(),
            }),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn lock_stats(&self) -> MutexGuard<'_, StatsState> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self, f: impl FnOnce(&mut DispatcherStats)) {
        f(&mut self.lock_stats().counters);
    }

    pub fn stats(&self) -> DispatcherStats {
        let s = self.lock_stats();
        DispatcherStats {
            uptime_ms: s.started.elapsed().as_millis() as u64,
            ..s.counters
        }
    }

    /// Zero all counters and restart the uptime clock.
    pub fn reset_stats(&self) {
        let mut s = self.lock_stats();
        s.counters = DispatcherStats::default();
        s.started = Instant::now();
    }

    /// Route one parsed message.
    ///
    /// Requests get exactly one reply carrying their id. Notifications and
    /// inbound responses produce `None`.
    pub fn handle(&self, msg: Message) -> Option<Message> {
        self.bump(|s| {
            s.messages_received = s.messages_received.wrapping_add(1);
            s.requests_processed = s.requests_processed.wrapping_add(1);
        });

        let method = match msg.kind {
            MessageKind::Response | MessageKind::Error => {
                debug!("RPC: ignoring inbound {:?} id={:?}", msg.kind, msg.id);
                return None;
            }
            MessageKind::Request | MessageKind::Notification => match msg.method.as_deref() {
                Some(m) => m,
                None => {
                    self.bump(|s| s.errors = s.errors.wrapping_add(1));
                    return Some(Message::from_code(msg.id, ErrorCode::InvalidRequest));
                }
            },
        };

        let outcome = self.route(method, msg.params.as_ref());
        if let Err(e) = &outcome {
            self.bump(|s| s.errors = s.errors.wrapping_add(1));
            debug!("RPC: '{}' failed: {} ({})", method, e.message, e.code);
        }

        match (msg.kind, msg.id) {
            (MessageKind::Request, Some(id)) => Some(match outcome {
                Ok(result) => Message::response(id, result),
                Err(e) => Message::with_error(Some(id), e),
            }),
            _ => None,
        }
    }

    fn route(&self, method: &str, params: Option<&Value>) -> Result<Value, RpcError> {
        match method {
            METHOD_TOOLS_LIST => self.list_tools(),
            METHOD_TOOLS_CALL => self.call_tool(params),
            METHOD_INITIALIZE => Ok(self.server_info()),
            METHOD_INITIALIZED => Ok(Value::Null),
            METHOD_PING => Ok(Value::from("pong")),
            _ => Err(RpcError::from(ErrorCode::MethodNotFound)),
        }
    }

    fn list_tools(&self) -> Result<Value, RpcError> {
        let tools = serde_json::to_value(self.registry.list())
            .map_err(|_| RpcError::from(ErrorCode::InternalError))?;
        let mut result = Map::new();
        result.insert("tools".into(), tools);
        Ok(Value::Object(result))
    }

    fn call_tool(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let Some(name) = params.and_then(|p| p.get("name")).and_then(Value::as_str) else {
            return Err(RpcError::new(
                ErrorCode::MethodNotFound.code(),
                "Tool not found: missing name",
            ));
        };
        let Some(tool) = self.registry.find(name) else {
            return Err(RpcError::new(
                ErrorCode::MethodNotFound.code(),
                format!("Tool not found: {name}"),
            ));
        };

        let empty = Value::Object(Map::new());
        let args = params
            .and_then(|p| p.get("arguments"))
            .unwrap_or(&empty);

        let mut out = ResultBuffer::with_limit(self.config.max_result_size);
        let result = tool
            .execute(args, &mut out)
            .and_then(|()| out.to_value())
            .map_err(|e| {
                warn!("RPC: tool '{}' failed: {}", name, e);
                let mut err = RpcError::from(ErrorCode::ToolExecutionFailed);
                err.data = Some(Value::from(e.to_string()));
                err
            })?;

        self.bump(|s| s.tools_executed = s.tools_executed.wrapping_add(1));
        Ok(result)
    }

    fn server_info(&self) -> Value {
        json!({
            "protocolVersion": self.config.protocol_version,
            "serverInfo": {
                "name": self.config.name,
                "version": self.config.version,
            },
            "capabilities": {
                "tools": { "listChanged": false },
            },
        })
    }

    /// Parse, route and serialize one raw message.
    ///
    /// `checksum` is the value the transport computed on receipt; a
    /// mismatch is counted but does not block processing. Replies larger
    /// than `max_message_size` are replaced by an internal error.
    pub fn handle_payload(&self, bytes: &[u8], checksum: Option<u16>) -> Option<Vec<u8>> {
        if let Some(expected) = checksum {
            let actual = codec::checksum(bytes);
            if actual != expected {
                warn!(
                    "RPC: checksum mismatch (expected {:04X}, got {:04X})",
                    expected, actual
                );
                self.bump(|s| s.checksum_mismatches = s.checksum_mismatches.wrapping_add(1));
            }
        }

        let reply = match Message::parse(bytes) {
            Ok(msg) => self.handle(msg)?,
            Err(e) => {
                warn!("RPC: {}", e);
                self.bump(|s| {
                    s.messages_received = s.messages_received.wrapping_add(1);
                    s.requests_processed = s.requests_processed.wrapping_add(1);
                    s.parse_errors = s.parse_errors.wrapping_add(1);
                    s.errors = s.errors.wrapping_add(1);
                });
                e.to_response()
            }
        };

        let mut out = reply.serialize();
        if out.len() > self.config.max_message_size {
            warn!(
                "RPC: response of {} bytes exceeds {} byte limit",
                out.len(),
                self.config.max_message_size
            );
            self.bump(|s| s.errors = s.errors.wrapping_add(1));
            out = Message::error(
                reply.id,
                ErrorCode::InternalError.code(),
                "Response too large",
            )
            .serialize();
        }

        self.bump(|s| s.messages_sent = s.messages_sent.wrapping_add(1));
        Some(out)
    }

    /// Transport callback bound to this dispatcher.
    pub fn message_handler(self: &Arc<Self>) -> MessageHandler {
        let dispatcher = Arc::clone(self);
        Arc::new(move |msg: InboundMessage<'_>| {
            debug!("RPC: {} bytes from connection {}", msg.payload.len(), msg.conn_id);
            dispatcher.handle_payload(msg.payload, Some(msg.checksum))
        })
    }
}
