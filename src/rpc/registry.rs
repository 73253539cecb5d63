//! Tool registry.
//!
//! A fixed-capacity table of [`Tool`] implementations, filled once at
//! startup and read-only afterwards. Lookups are linear; the table holds at
//! most [`MAX_TOOLS`] entries.

use std::io;

use log::info;
use serde::Serialize;
use serde_json::Value;

use crate::error::{RegistryError, ToolError};

/// Tool table capacity.
pub const MAX_TOOLS: usize = 8;

/// Largest tool result in bytes.
pub const TOOL_RESULT_CAPACITY: usize = 512;

// ── Result buffer ────────────────────────────────────────────

/// Caller-owned, bounded output buffer handed to [`Tool::execute`].
///
/// Writes past the limit fail rather than truncate.
pub struct ResultBuffer {
    buf: heapless::Vec<u8, TOOL_RESULT_CAPACITY>,
    limit: usize,
}

impl ResultBuffer {
    pub fn new() -> Self {
        Self::with_limit(TOOL_RESULT_CAPACITY)
    }

    /// Buffer accepting at most `limit` bytes (clamped to the capacity).
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: heapless::Vec::new(),
            limit: limit.min(TOOL_RESULT_CAPACITY),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Replace the contents with the JSON encoding of `value`.
    pub fn write_json(&mut self, value: &Value) -> Result<(), ToolError> {
        self.clear();
        serde_json::to_writer(&mut *self, value).map_err(|e| {
            self.buf.clear();
            if e.is_io() {
                ToolError::ResultTooLarge { limit: self.limit }
            } else {
                ToolError::Failed(e.to_string())
            }
        })
    }

    /// Parse the buffer back into a JSON value.
    pub fn to_value(&self) -> Result<Value, ToolError> {
        serde_json::from_slice(&self.buf)
            .map_err(|e| ToolError::Failed(format!("tool produced invalid JSON: {e}")))
    }
}

impl Default for ResultBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for ResultBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.limit {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "tool result buffer full",
            ));
        }
        self.buf
            .extend_from_slice(data)
            .map_err(|()| io::Error::new(io::ErrorKind::WriteZero, "tool result buffer full"))?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Tool trait ───────────────────────────────────────────────

/// A named, schema-described synchronous operation.
///
/// `execute` runs on the receiving connection's thread and must return
/// promptly. Implementations guarding shared hardware do their own locking.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the `arguments` object.
    fn input_schema(&self) -> Value;
    /// Run the tool, writing a JSON result into `out`.
    fn execute(&self, args: &Value, out: &mut ResultBuffer) -> Result<(), ToolError>;
}

/// Catalogue entry as returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Adapter turning a closure into a [`Tool`].
pub struct FnTool<F> {
    name: &'static str,
    description: &'static str,
    schema: Value,
    f: F,
}

impl<F> FnTool<F>
where
    F: Fn(&Value) -> Result<Value, ToolError> + Send + Sync,
{
    pub fn new(name: &'static str, description: &'static str, schema: Value, f: F) -> Self {
        Self {
            name,
            description,
            schema,
            f,
        }
    }
}

impl<F> Tool for FnTool<F>
where
    F: Fn(&Value) -> Result<Value, ToolError> + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    fn execute(&self, args: &Value, out: &mut ResultBuffer) -> Result<(), ToolError> {
        let value = (self.f)(args)?;
        out.write_json(&value)
    }
}

// ── Registry ─────────────────────────────────────────────────

/// Fixed-capacity tool table.
pub struct ToolRegistry {
    tools: heapless::Vec<Box<dyn Tool>, MAX_TOOLS>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: heapless::Vec::new(),
        }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), RegistryError> {
        if self.find(tool.name()).is_some() {
            return Err(RegistryError::DuplicateName(tool.name().to_owned()));
        }
        let name = tool.name().to_owned();
        self.tools
            .push(tool)
            .map_err(|_| RegistryError::TableFull)?;
        info!("RPC: registered tool '{}' ({}/{})", name, self.tools.len(), MAX_TOOLS);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| &**t)
    }

    /// Catalogue in registration order.
    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_owned(),
                description: t.description().to_owned(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
