//! `system_info`: chip, heap and uptime figures.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real figures from `esp_idf_sys`.
//! - **all other targets**: simulated heap figures, real uptime.
//!
//! `restart` is acknowledged and logged but never executed.

use std::time::Instant;

use log::warn;
use serde_json::{Value, json};

use super::{action, success};
use crate::config::ServerConfig;
use crate::error::ToolError;
use crate::rpc::registry::{ResultBuffer, Tool};

pub struct SystemInfoTool {
    server_name: String,
    server_version: String,
    started: Instant,
}

impl SystemInfoTool {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            server_name: config.name.clone(),
            server_version: config.version.clone(),
            started: Instant::now(),
        }
    }

    fn info(&self) -> Value {
        let p = platform::snapshot();
        json!({
            "server": self.server_name,
            "version": self.server_version,
            "chip_model": p.chip_model,
            "chip_revision": p.chip_revision,
            "cores": p.cores,
            "free_heap": p.free_heap,
            "min_free_heap": p.min_free_heap,
            "uptime_ms": self.started.elapsed().as_millis() as u64,
            "reset_reason": p.reset_reason,
        })
    }
}

impl Tool for SystemInfoTool {
    fn name(&self) -> &str {
        "system_info"
    }

    fn description(&self) -> &str {
        "Get system information or request a restart"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["get_info", "get_stats", "restart"],
                    "default": "get_info"
                }
            }
        })
    }

    fn execute(&self, args: &Value, out: &mut ResultBuffer) -> Result<(), ToolError> {
        // `action` is optional here and defaults to get_info.
        let act = if args.get("action").is_some() {
            action(args)?
        } else {
            "get_info"
        };
        let result = match act {
            "get_info" | "get_stats" => success(self.info()),
            "restart" => {
                warn!("TOOL: restart requested over RPC, not executed");
                success(json!({
                    "result": "Restart command received (not executed)"
                }))
            }
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "unknown action '{other}'"
                )));
            }
        };
        out.write_json(&result)
    }
}

struct PlatformInfo {
    chip_model: &'static str,
    chip_revision: u32,
    cores: u32,
    free_heap: u32,
    min_free_heap: u32,
    reset_reason: i32,
}

#[cfg(target_os = "espidf")]
mod platform {
    use super::PlatformInfo;

    pub(super) fn snapshot() -> PlatformInfo {
        // SAFETY: plain ESP-IDF getters with no preconditions; `info` is
        // fully written by `esp_chip_info`.
        unsafe {
            let mut info = esp_idf_sys::esp_chip_info_t::default();
            esp_idf_sys::esp_chip_info(&mut info);
            PlatformInfo {
                chip_model: "ESP32-C6",
                chip_revision: u32::from(info.revision),
                cores: u32::from(info.cores),
                free_heap: esp_idf_sys::esp_get_free_heap_size(),
                min_free_heap: esp_idf_sys::esp_get_minimum_free_heap_size(),
                reset_reason: esp_idf_sys::esp_reset_reason() as i32,
            }
        }
    }
}

#[cfg(not(target_os = "espidf"))]
mod platform {
    use super::PlatformInfo;

    pub(super) fn snapshot() -> PlatformInfo {
        PlatformInfo {
            chip_model: "host-sim",
            chip_revision: 0,
            cores: std::thread::available_parallelism().map_or(1, |n| n.get() as u32),
            free_heap: 256 * 1024,
            min_free_heap: 200 * 1024,
            reset_reason: 1,
        }
    }
}
