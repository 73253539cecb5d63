//! Byte-link adapters feeding the serial transport.
//!
//! | Adapter       | Implements         | Connects to                     |
//! |---------------|--------------------|---------------------------------|
//! | `stream_link` | LinkRx / LinkTx    | any `std::io` stream (TCP, pipe) |
//! | `uart`        | LinkRx / LinkTx    | ESP-IDF UART driver (espidf)    |

pub mod stream_link;
#[cfg(target_os = "espidf")]
pub mod uart;
