//! Built-in tools.
//!
//! | Tool           | Module        | Touches                     |
//! |----------------|---------------|-----------------------------|
//! | `echo`         | `echo`        | nothing                     |
//! | `system_info`  | `system_info` | heap / uptime / chip info   |
//! | `gpio_control` | `gpio`        | status LED + user button    |
//!
//! Tools answer `{"status": "success", "data": {...}}`, except `echo`, which
//! returns its arguments unchanged.

pub mod echo;
pub mod gpio;
pub mod system_info;

use serde_json::{Value, json};

use crate::config::ServerConfig;
use crate::error::{RegistryError, ToolError};
use crate::rpc::registry::ToolRegistry;

pub use echo::EchoTool;
pub use gpio::GpioTool;
pub use system_info::SystemInfoTool;

/// Register the hardware-independent built-ins enabled in `config`.
///
/// `gpio_control` needs concrete pins and is registered by the bootstrap.
pub fn register_builtin(
    registry: &mut ToolRegistry,
    config: &ServerConfig,
) -> Result<(), RegistryError> {
    if config.enable_echo_tool {
        registry.register(Box::new(EchoTool))?;
    }
    if config.enable_system_info_tool {
        registry.register(Box::new(SystemInfoTool::new(config)))?;
    }
    Ok(())
}

/// Standard success envelope.
pub(crate) fn success(data: Value) -> Value {
    json!({ "status": "success", "data": data })
}

/// Read the required string `action` argument.
pub(crate) fn action(args: &Value) -> Result<&str, ToolError> {
    args.get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments("missing or invalid 'action'".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_respects_flags() {
        let mut r = ToolRegistry::new();
        let config = ServerConfig {
            enable_system_info_tool: false,
            ..ServerConfig::default()
        };
        register_builtin(&mut r, &config).unwrap();
        assert_eq!(r.names().collect::<Vec<_>>(), ["echo"]);
    }

    #[test]
    fn action_must_be_string() {
        assert_eq!(action(&json!({"action": "get_info"})), Ok("get_info"));
        assert!(action(&json!({"action": 3})).is_err());
        assert!(action(&json!({})).is_err());
    }
}
