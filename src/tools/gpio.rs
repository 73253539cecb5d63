//! `gpio_control`: status LED and user button.
//!
//! ## Hardware
//!
//! Any `embedded-hal` pins: a stateful output for the LED and an input for
//! an active-low button with pull-up. Presses are counted by the falling-edge
//! ISR into the shared [`PressCounter`]; the tool only reads it.
//!
//! | Action        | Arguments       | Data                                        |
//! |---------------|-----------------|---------------------------------------------|
//! | `set_led`     | `state: bool`   | `led_state`, `message`                      |
//! | `read_button` | none            | `button_pressed`, `button_count`, `button_level` |
//! | `get_status`  | none            | `led_on`, `button_pressed`, `button_count`  |

use std::sync::{Arc, Mutex, PoisonError};

use embedded_hal::digital::{InputPin, StatefulOutputPin};
use log::debug;
use serde_json::{Value, json};

use super::{action, success};
use crate::drivers::button::PressCounter;
use crate::error::ToolError;
use crate::rpc::registry::{ResultBuffer, Tool};

struct Pins<L, B> {
    led: L,
    button: B,
}

pub struct GpioTool<L, B> {
    pins: Mutex<Pins<L, B>>,
    presses: Arc<PressCounter>,
}

impl<L, B> GpioTool<L, B>
where
    L: StatefulOutputPin + Send,
    B: InputPin + Send,
{
    pub fn new(led: L, button: B, presses: Arc<PressCounter>) -> Self {
        Self {
            pins: Mutex::new(Pins { led, button }),
            presses,
        }
    }

    fn count(&self) -> u32 {
        self.presses.count()
    }

    fn run(&self, args: &Value) -> Result<Value, ToolError> {
        let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        match action(args)? {
            "set_led" => {
                let on = args.get("state").and_then(Value::as_bool).ok_or_else(|| {
                    ToolError::InvalidArguments("'state' must be a boolean".into())
                })?;
                if on {
                    pins.led.set_high().map_err(pin_error)?;
                } else {
                    pins.led.set_low().map_err(pin_error)?;
                }
                debug!("TOOL: led -> {}", on);
                Ok(success(json!({
                    "led_state": on,
                    "message": "LED state updated",
                })))
            }
            "read_button" => {
                let level = pins.button.is_high().map_err(pin_error)?;
                Ok(success(json!({
                    "button_pressed": !level,
                    "button_count": self.count(),
                    "button_level": u8::from(level),
                })))
            }
            "get_status" => {
                let led_on = pins.led.is_set_high().map_err(pin_error)?;
                let pressed = pins.button.is_low().map_err(pin_error)?;
                Ok(success(json!({
                    "led_on": led_on,
                    "button_pressed": pressed,
                    "button_count": self.count(),
                })))
            }
            other => Err(ToolError::InvalidArguments(format!(
                "unknown action '{other}'"
            ))),
        }
    }
}

fn pin_error(e: impl embedded_hal::digital::Error) -> ToolError {
    ToolError::Failed(format!("gpio error: {:?}", e.kind()))
}

impl<L, B> Tool for GpioTool<L, B>
where
    L: StatefulOutputPin + Send,
    B: InputPin + Send,
{
    fn name(&self) -> &str {
        "gpio_control"
    }

    fn description(&self) -> &str {
        "Control the status LED and read the user button"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["set_led", "read_button", "get_status"]
                },
                "state": { "type": "boolean" }
            },
            "required": ["action"]
        })
    }

    fn execute(&self, args: &Value, out: &mut ResultBuffer) -> Result<(), ToolError> {
        let value = self.run(args)?;
        out.write_json(&value)
    }
}
