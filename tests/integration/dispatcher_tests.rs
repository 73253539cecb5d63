//! Integration tests for the dispatcher with the built-in tools.
//!
//! Drives raw JSON bytes through `handle_payload` exactly as a transport
//! would and checks the serialized replies.

use serde_json::{Value, json};
use tinymcp::config::ServerConfig;
use tinymcp::error::ToolError;
use tinymcp::rpc::codec;
use tinymcp::rpc::dispatcher::Dispatcher;
use tinymcp::rpc::registry::{FnTool, ToolRegistry};

use crate::mock_link::dispatcher;

fn call(d: &Dispatcher, raw: &str) -> Option<Value> {
    d.handle_payload(raw.as_bytes(), None)
        .map(|bytes| serde_json::from_slice(&bytes).unwrap())
}

#[test]
fn initialize_list_call_session() {
    let d = dispatcher();

    let init = call(&d, r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#).unwrap();
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(init["result"]["serverInfo"]["name"], "esp32-c6-mcp");

    assert!(call(&d, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).is_none());

    let list = call(&d, r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).unwrap();
    let names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["echo", "system_info"]);
    assert!(list["result"]["tools"][0]["inputSchema"].is_object());

    let echo = call(
        &d,
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
    )
    .unwrap();
    assert_eq!(echo["id"], 3);
    assert_eq!(echo["result"], json!({"message": "hi"}));

    let s = d.stats();
    assert_eq!(s.messages_received, 4);
    assert_eq!(s.messages_sent, 3);
    assert_eq!(s.tools_executed, 1);
    assert_eq!(s.errors, 0);
}

#[test]
fn system_info_defaults_to_get_info() {
    let d = dispatcher();
    let reply = call(
        &d,
        r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"name":"system_info"}}"#,
    )
    .unwrap();
    assert_eq!(reply["result"]["status"], "success");
    assert!(reply["result"]["data"]["uptime_ms"].is_u64());
}

#[test]
fn unknown_tool_is_method_not_found() {
    let d = dispatcher();
    let reply = call(
        &d,
        r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"nope"}}"#,
    )
    .unwrap();
    assert_eq!(reply["id"], 5);
    assert_eq!(reply["error"]["code"], -32601);
    assert_eq!(reply["error"]["message"], "Tool not found: nope");
    assert_eq!(d.stats().errors, 1);
}

#[test]
fn tool_failure_carries_reason_in_data() {
    let d = dispatcher();
    let reply = call(
        &d,
        r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"system_info","arguments":{"action":"melt"}}}"#,
    )
    .unwrap();
    assert_eq!(reply["error"]["code"], -32000);
    assert!(reply["error"]["data"].as_str().unwrap().contains("melt"));
}

#[test]
fn garbage_gets_parse_error_with_null_id() {
    let d = dispatcher();
    let reply = call(&d, "{not json").unwrap();
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["error"]["code"], -32700);
    let s = d.stats();
    assert_eq!(s.parse_errors, 1);
    assert_eq!(s.messages_sent, 1);
}

#[test]
fn unknown_method_keeps_request_id() {
    let d = dispatcher();
    let reply = call(&d, r#"{"jsonrpc":"2.0","id":77,"method":"bogus"}"#).unwrap();
    assert_eq!(reply["id"], 77);
    assert_eq!(reply["error"]["code"], -32601);
}

#[test]
fn notifications_never_reply_even_on_error() {
    let d = dispatcher();
    assert!(call(&d, r#"{"jsonrpc":"2.0","method":"bogus"}"#).is_none());
    assert_eq!(d.stats().errors, 1);
}

#[test]
fn checksum_mismatch_is_counted_but_processed() {
    let d = dispatcher();
    let raw = br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
    let good = codec::checksum(raw);
    assert!(d.handle_payload(raw, Some(good)).is_some());
    assert!(d.handle_payload(raw, Some(good.wrapping_add(1))).is_some());
    assert_eq!(d.stats().checksum_mismatches, 1);
}

#[test]
fn oversized_tool_result_is_execution_failure() {
    let mut registry = ToolRegistry::new();
    registry
        .register(Box::new(FnTool::new("big", "Large output", json!({}), |_| {
            Ok::<_, ToolError>(json!({ "blob": "x".repeat(2000) }))
        })))
        .unwrap();
    let d = Dispatcher::new(ServerConfig::default(), registry);
    let reply = call(
        &d,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"big"}}"#,
    )
    .unwrap();
    assert_eq!(reply["error"]["code"], -32000);
}

#[test]
fn reply_over_message_limit_becomes_internal_error() {
    let config = ServerConfig {
        max_message_size: 64,
        ..ServerConfig::default()
    };
    let mut registry = ToolRegistry::new();
    tinymcp::tools::register_builtin(&mut registry, &config).unwrap();
    let d = Dispatcher::new(config, registry);
    let reply = call(&d, r#"{"jsonrpc":"2.0","id":4,"method":"tools/list"}"#).unwrap();
    assert_eq!(reply["id"], 4);
    assert_eq!(reply["error"]["code"], -32603);
}
