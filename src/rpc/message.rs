//! JSON-RPC 2.0 envelope.
//!
//! A [`Message`] is parsed from raw bytes by a transport, routed by the
//! dispatcher, and serialized back to bytes for the reply. Classification:
//!
//! | `method` | `id`  | `result`/`error` | kind         |
//! |----------|-------|------------------|--------------|
//! | yes      | yes   | -                | Request      |
//! | yes      | no    | -                | Notification |
//! | no       | yes   | `result`         | Response     |
//! | no       | any   | `error`          | Error        |
//!
//! Anything else is an invalid request.

use core::fmt;

use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version tag written on every outbound message.
pub const JSONRPC_VERSION: &str = "2.0";

// ── Error codes ──────────────────────────────────────────────

/// JSON-RPC error codes used by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    /// Reserved; tool dispatch reports argument problems as execution failures.
    InvalidParams = -32602,
    InternalError = -32603,
    ToolExecutionFailed = -32000,
}

impl ErrorCode {
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ToolExecutionFailed => "Tool execution failed",
        }
    }
}

/// The `error` member of an Error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<ErrorCode> for RpcError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code.code(), code.message())
    }
}

// ── Parse errors ─────────────────────────────────────────────

/// Why inbound bytes could not become a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not valid JSON. The caller's id is unknowable.
    Malformed,
    /// Valid JSON that is not a valid envelope.
    InvalidRequest {
        id: Option<u32>,
        reason: &'static str,
    },
}

impl ParseError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Malformed => ErrorCode::ParseError,
            Self::InvalidRequest { .. } => ErrorCode::InvalidRequest,
        }
    }

    /// Id to answer with (`None` serializes as `null`).
    pub fn id(&self) -> Option<u32> {
        match self {
            Self::Malformed => None,
            Self::InvalidRequest { id, .. } => *id,
        }
    }

    /// Best-effort error reply for the caller.
    pub fn to_response(&self) -> Message {
        Message::from_code(self.id(), self.code())
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed JSON"),
            Self::InvalidRequest { reason, .. } => write!(f, "invalid request: {reason}"),
        }
    }
}

impl std::error::Error for ParseError {}

// ── Message ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Option<u32>,
    pub kind: MessageKind,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

/// Wire shape; `id` is `Some(None)` when it must be written as `null`.
#[derive(Serialize)]
struct Envelope<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Option<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a RpcError>,
}

impl Message {
    /// A Request when `id` is set, otherwise a Notification.
    pub fn request(method: impl Into<String>, params: Option<Value>, id: Option<u32>) -> Self {
        Self {
            id,
            kind: if id.is_some() {
                MessageKind::Request
            } else {
                MessageKind::Notification
            },
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::request(method, params, None)
    }

    pub fn response(id: u32, result: Value) -> Self {
        Self {
            id: Some(id),
            kind: MessageKind::Response,
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<u32>, code: i32, message: impl Into<String>) -> Self {
        Self::with_error(id, RpcError::new(code, message))
    }

    pub fn from_code(id: Option<u32>, code: ErrorCode) -> Self {
        Self::with_error(id, code.into())
    }

    pub fn with_error(id: Option<u32>, error: RpcError) -> Self {
        Self {
            id,
            kind: MessageKind::Error,
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_request(&self) -> bool {
        self.kind == MessageKind::Request
    }

    pub fn is_notification(&self) -> bool {
        self.kind == MessageKind::Notification
    }

    pub fn is_response(&self) -> bool {
        self.kind == MessageKind::Response
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }

    /// Parse one message from raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|_| ParseError::Malformed)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        let Value::Object(mut obj) = value else {
            return Err(ParseError::InvalidRequest {
                id: None,
                reason: "not a JSON object",
            });
        };

        let id = match obj.remove("id") {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) => Some(n),
                None => {
                    return Err(ParseError::InvalidRequest {
                        id: None,
                        reason: "id must be an unsigned 32-bit integer",
                    });
                }
            },
        };
        let invalid = |reason: &'static str| ParseError::InvalidRequest { id, reason };

        let method = match obj.remove("method") {
            None => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => return Err(invalid("method must be a string")),
        };
        let params = obj.remove("params");
        let result = obj.remove("result");
        let error = match obj.remove("error") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                serde_json::from_value::<RpcError>(v)
                    .map_err(|_| invalid("malformed error object"))?,
            ),
        };

        let kind = if method.is_some() {
            if id.is_some() {
                MessageKind::Request
            } else {
                MessageKind::Notification
            }
        } else {
            match (&result, &error) {
                (Some(_), Some(_)) => return Err(invalid("both result and error present")),
                (None, Some(_)) => MessageKind::Error,
                (Some(_), None) if id.is_some() => MessageKind::Response,
                (Some(_), None) => return Err(invalid("response without id")),
                (None, None) => return Err(invalid("missing method")),
            }
        };

        Ok(Self {
            id,
            kind,
            method,
            params,
            result,
            error,
        })
    }

    /// Compact JSON encoding with `"jsonrpc":"2.0"`.
    pub fn serialize(&self) -> Vec<u8> {
        let id = match self.kind {
            MessageKind::Notification => None,
            MessageKind::Request => self.id.map(Some),
            MessageKind::Response | MessageKind::Error => Some(self.id),
        };
        let envelope = Envelope {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: self.method.as_deref(),
            params: self.params.as_ref(),
            result: self.result.as_ref(),
            error: self.error.as_ref(),
        };
        serde_json::to_vec(&envelope).unwrap_or_else(|e| {
            // Only reachable with non-string map keys, which `Value` cannot hold.
            error!("RPC: serialize failed: {}", e);
            Vec::new()
        })
    }
}
