//! Transport-agnostic JSON-RPC subsystem.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        RPC Stack                             │
//! │                                                              │
//! │  ┌───────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐ │
//! │  │ Transport │──▶│  Codec   │──▶│ Message  │──▶│Dispatcher│ │
//! │  │ serial /  │   │ (framing)│   │ (JSON)   │   │  → Tools │ │
//! │  │ socket    │   └──────────┘   └──────────┘   └──────────┘ │
//! │  └───────────┘                                      │       │
//! │       ▲              reply bytes                    │       │
//! │       └─────────────────────────────────────────────┘       │
//! │                                                              │
//! │  Lifecycle: link up → start transport, link down → stop      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod dispatcher;
pub mod lifecycle;
pub mod message;
pub mod registry;
pub mod serial;
pub mod socket;
pub mod transport;
