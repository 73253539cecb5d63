//! Server configuration parameters
//!
//! All tunable parameters for the server, the socket transport and the
//! serial transport. Defaults match the shipped firmware; a bootstrap may
//! override them from a JSON blob via [`ServerConfig::from_json`].

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rpc::registry::TOOL_RESULT_CAPACITY;
use crate::rpc::socket::MAX_CLIENT_SLOTS;

/// Dispatcher-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name reported by `initialize`
    pub name: String,
    /// Server version reported by `initialize`
    pub version: String,
    /// Protocol revision reported by `initialize`
    pub protocol_version: String,
    /// Largest serialized response (bytes) the dispatcher will emit
    pub max_message_size: usize,
    /// Largest tool result (bytes); at most [`TOOL_RESULT_CAPACITY`]
    pub max_result_size: usize,

    // --- Built-in tools ---
    pub enable_echo_tool: bool,
    pub enable_system_info_tool: bool,
    pub enable_gpio_tool: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "esp32-c6-mcp".into(),
            version: "1.0.0".into(),
            protocol_version: "2024-11-05".into(),
            max_message_size: 2048,
            max_result_size: TOOL_RESULT_CAPACITY,

            enable_echo_tool: true,
            enable_system_info_tool: true,
            enable_gpio_tool: true,
        }
    }
}

impl ServerConfig {
    /// Parse a (possibly partial) JSON override; missing fields take defaults.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size == 0 {
            return Err(ConfigError::ZeroBuffer("max_message_size"));
        }
        if self.max_result_size == 0 {
            return Err(ConfigError::ZeroBuffer("max_result_size"));
        }
        if self.max_result_size > TOOL_RESULT_CAPACITY {
            return Err(ConfigError::ResultSize(self.max_result_size));
        }
        Ok(())
    }
}

/// Multi-client socket transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Listen address
    pub bind_addr: String,
    /// TCP listen port (0 picks an ephemeral port)
    pub port: u16,
    /// Concurrent clients; at most [`MAX_CLIENT_SLOTS`]
    pub max_clients: usize,
    /// Per-message receive buffer (bytes)
    pub buffer_size: usize,
    /// Wrap messages in START/END frames instead of one message per read
    pub framing: bool,

    // --- Timing ---
    /// Accept poll interval (milliseconds)
    pub accept_poll_ms: u64,
    /// Per-client receive timeout (milliseconds)
    pub recv_timeout_ms: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8080,
            max_clients: 4,
            buffer_size: 2048,
            framing: false,

            accept_poll_ms: 50,
            recv_timeout_ms: 100,
        }
    }
}

impl SocketConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clients == 0 || self.max_clients > MAX_CLIENT_SLOTS {
            return Err(ConfigError::MaxClients(self.max_clients));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBuffer("buffer_size"));
        }
        Ok(())
    }
}

/// Single-link serial transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// UART baud rate
    pub baud_rate: u32,
    /// Receive frame buffer (bytes); longer frames count as overruns
    pub buffer_size: usize,
    /// How long `send` waits for transmit-queue space (milliseconds)
    pub send_timeout_ms: u64,
    /// Idle sleep of the transmit unit between queue polls (milliseconds)
    pub tx_poll_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            buffer_size: 2048,
            send_timeout_ms: 100,
            tx_poll_ms: 2,
        }
    }
}

impl SerialConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBuffer("buffer_size"));
        }
        Ok(())
    }
}
