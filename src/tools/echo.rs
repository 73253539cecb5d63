//! `echo`: returns its arguments unchanged. Handy for link testing.

use serde_json::{Value, json};

use crate::error::ToolError;
use crate::rpc::registry::{ResultBuffer, Tool};

pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo back the provided arguments"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "description": "Text to echo back" }
            },
            "additionalProperties": true
        })
    }

    fn execute(&self, args: &Value, out: &mut ResultBuffer) -> Result<(), ToolError> {
        out.write_json(args)
    }
}
