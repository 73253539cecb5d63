//! Fuzz target: `Dispatcher::handle_payload`
//!
//! Feeds arbitrary bytes through parse → route → serialize and checks
//! that every reply is itself a valid JSON-RPC message within the size
//! limit.
//!
//! cargo fuzz run fuzz_message_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use tinymcp::config::ServerConfig;
use tinymcp::rpc::dispatcher::Dispatcher;
use tinymcp::rpc::message::Message;
use tinymcp::rpc::registry::ToolRegistry;
use tinymcp::tools;

fuzz_target!(|data: &[u8]| {
    let config = ServerConfig::default();
    let limit = config.max_message_size;
    let mut registry = ToolRegistry::new();
    tools::register_builtin(&mut registry, &config).expect("builtins fit");
    let dispatcher = Dispatcher::new(config, registry);

    if let Some(reply) = dispatcher.handle_payload(data, None) {
        assert!(reply.len() <= limit);
        let msg = Message::parse(&reply).expect("reply must parse");
        assert!(msg.is_response() || msg.is_error());
    }
});
