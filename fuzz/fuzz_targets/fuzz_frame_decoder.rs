//! Fuzz target: `FrameDecoder::feed_slice`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder and
//! asserts that it never panics, never yields empty or oversized payloads,
//! and that every payload it yields re-frames to something it decodes
//! identically.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use tinymcp::rpc::codec::{self, FrameDecoder};

const CAPACITY: usize = 2048;

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new(CAPACITY);
    let mut payloads = Vec::new();
    decoder.feed_slice(data, |p| {
        assert!(!p.is_empty(), "decoder must not yield empty payload");
        assert!(p.len() <= CAPACITY, "payload exceeds decoder capacity");
        payloads.push(p.to_vec());
    });

    for p in payloads {
        assert_eq!(codec::unframe(&codec::frame(&p)).as_deref(), Ok(p.as_slice()));
    }

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    decoder.feed_slice(data, |_| {});
});
