//! Unified error types for the tinymcp server.
//!
//! Each layer owns a small error enum with a human-readable `Display`
//! impl; the top-level [`Error`] wraps them so that bootstrap code can
//! funnel every failure through a single type.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the server funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Frame encoding or decoding failed.
    Codec(CodecError),
    /// Tool registration failed.
    Registry(RegistryError),
    /// A transport could not start or send.
    Transport(TransportError),
    /// Configuration is invalid.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

/// Crate-wide result alias.
pub type Result<T, E = Error> = core::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Output buffer cannot hold the encoded frame.
    BufferTooSmall { needed: usize, available: usize },
    /// Decoded payload exceeds the caller's capacity.
    PayloadTooLarge { max: usize },
    /// Input does not begin with the start marker.
    MissingStartMarker,
    /// Input does not end with the end marker.
    MissingEndMarker,
    /// A reserved byte appeared unescaped inside the frame body.
    UnexpectedMarker(u8),
    /// The frame body ends with an escape byte.
    DanglingEscape,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall { needed, available } => {
                write!(f, "output buffer too small ({needed} needed, {available} available)")
            }
            Self::PayloadTooLarge { max } => write!(f, "payload exceeds {max} bytes"),
            Self::MissingStartMarker => write!(f, "missing start marker"),
            Self::MissingEndMarker => write!(f, "missing end marker"),
            Self::UnexpectedMarker(b) => write!(f, "unescaped marker 0x{b:02X} in frame body"),
            Self::DanglingEscape => write!(f, "frame ends with an escape byte"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    DuplicateName(String),
    /// The fixed-capacity tool table has no free entry.
    TableFull,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName(name) => write!(f, "tool '{name}' already registered"),
            Self::TableFull => write!(f, "tool table full"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Binding or listening on the socket failed.
    Bind(String),
    /// Spawning an execution unit failed.
    Spawn(String),
    /// The transport is not running.
    NotRunning,
    /// No connection with this id.
    UnknownConnection(u32),
    /// The outbound queue stayed full for the whole send timeout.
    QueueFull,
    /// The message is larger than the configured buffer.
    MessageTooLarge { len: usize, max: usize },
    /// Writing to the underlying link failed.
    Link(LinkError),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(msg) => write!(f, "bind failed: {msg}"),
            Self::Spawn(msg) => write!(f, "task spawn failed: {msg}"),
            Self::NotRunning => write!(f, "transport not running"),
            Self::UnknownConnection(id) => write!(f, "no connection with id {id}"),
            Self::QueueFull => write!(f, "transmit queue full"),
            Self::MessageTooLarge { len, max } => {
                write!(f, "message of {len} bytes exceeds {max} byte limit")
            }
            Self::Link(e) => write!(f, "link: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<LinkError> for TransportError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

/// Failure of a raw byte link (UART, stream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The peer closed the link.
    Closed,
    /// Driver or OS level I/O failure.
    Io(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "link closed"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_clients` is zero or above the slot-table capacity.
    MaxClients(usize),
    /// A buffer size is zero.
    ZeroBuffer(&'static str),
    /// The tool result limit exceeds the result buffer capacity.
    ResultSize(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxClients(n) => write!(f, "max_clients {n} out of range"),
            Self::ZeroBuffer(name) => write!(f, "{name} must be non-zero"),
            Self::ResultSize(n) => write!(f, "max_result_size {n} exceeds result buffer"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Tool errors
// ---------------------------------------------------------------------------

/// Failure reported by a tool's `execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Arguments missing or of the wrong shape.
    InvalidArguments(String),
    /// The result did not fit the caller's buffer.
    ResultTooLarge { limit: usize },
    /// The underlying device operation failed.
    Failed(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArguments(msg) => write!(f, "invalid arguments: {msg}"),
            Self::ResultTooLarge { limit } => write!(f, "result exceeds {limit} bytes"),
            Self::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ToolError {}
