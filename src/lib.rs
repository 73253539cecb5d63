//! tinymcp: a small JSON-RPC tool server for microcontrollers.
//!
//! Exposes every module for integration testing. All ESP-IDF-specific code
//! is guarded by `#[cfg(target_os = "espidf")]` within each module; on the
//! host the same code runs over `std::net` and in-memory links.

#![deny(unused_must_use)]

pub mod adapters;
pub mod config;
pub mod drivers;
pub mod error;
pub mod rpc;
pub mod tools;

pub use config::{SerialConfig, ServerConfig, SocketConfig};
pub use error::{Error, Result};
pub use rpc::dispatcher::Dispatcher;
pub use rpc::lifecycle::{LifecycleController, LinkEvent, post_link_event};
pub use rpc::registry::{Tool, ToolRegistry};
pub use rpc::serial::SerialTransport;
pub use rpc::socket::SocketTransport;
pub use rpc::transport::Transport;
