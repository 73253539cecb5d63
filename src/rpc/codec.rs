//! Byte-stuffed frame codec.
//!
//! Wire format:
//! ```text
//! ┌───────┬──────────────────────────────┬─────┐
//! │ START │ escaped JSON payload (N B)   │ END │
//! │ 0x7E  │                              │ 0x7F│
//! └───────┴──────────────────────────────┴─────┘
//! ```
//!
//! Any payload byte equal to `START`, `END` or `ESCAPE` is sent as
//! `ESCAPE, byte ^ ESCAPE_XOR`. The streaming [`FrameDecoder`] tolerates
//! line noise: bytes outside a frame are ignored, oversize frames are
//! discarded and counted, and a stray `START` restarts the frame.

use crate::error::CodecError;

/// Frame start marker.
pub const START: u8 = 0x7E;
/// Frame end marker.
pub const END: u8 = 0x7F;
/// Escape prefix.
pub const ESCAPE: u8 = 0x7D;
/// XOR mask applied to an escaped byte.
pub const ESCAPE_XOR: u8 = 0x20;

#[inline]
fn needs_escape(b: u8) -> bool {
    matches!(b, START | END | ESCAPE)
}

/// Size of the frame `payload` encodes to.
pub fn framed_len(payload: &[u8]) -> usize {
    2 + payload.len() + payload.iter().filter(|&&b| needs_escape(b)).count()
}

/// Encode `payload` into `out`, returning the number of bytes written.
///
/// Never truncates: if `out` is too small nothing useful is written and
/// `BufferTooSmall` reports the required size.
pub fn encode_frame(payload: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
    let needed = framed_len(payload);
    if needed > out.len() {
        return Err(CodecError::BufferTooSmall {
            needed,
            available: out.len(),
        });
    }

    let mut n = 0;
    out[n] = START;
    n += 1;
    for &b in payload {
        if needs_escape(b) {
            out[n] = ESCAPE;
            out[n + 1] = b ^ ESCAPE_XOR;
            n += 2;
        } else {
            out[n] = b;
            n += 1;
        }
    }
    out[n] = END;
    Ok(n + 1)
}

/// Encode `payload` into a freshly allocated frame.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(framed_len(payload));
    out.push(START);
    for &b in payload {
        if needs_escape(b) {
            out.push(ESCAPE);
            out.push(b ^ ESCAPE_XOR);
        } else {
            out.push(b);
        }
    }
    out.push(END);
    out
}

/// Walk the body of a complete frame, handing each unescaped byte to `sink`.
fn unescape_body(
    framed: &[u8],
    mut sink: impl FnMut(u8) -> Result<(), CodecError>,
) -> Result<(), CodecError> {
    match framed.first() {
        Some(&START) => {}
        _ => return Err(CodecError::MissingStartMarker),
    }
    if framed.len() < 2 || framed[framed.len() - 1] != END {
        return Err(CodecError::MissingEndMarker);
    }

    let body = &framed[1..framed.len() - 1];
    let mut escaped = false;
    for &b in body {
        if escaped {
            sink(b ^ ESCAPE_XOR)?;
            escaped = false;
        } else if b == ESCAPE {
            escaped = true;
        } else if b == START || b == END {
            return Err(CodecError::UnexpectedMarker(b));
        } else {
            sink(b)?;
        }
    }
    if escaped {
        return Err(CodecError::DanglingEscape);
    }
    Ok(())
}

/// Decode one complete frame.
pub fn unframe(framed: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(framed.len().saturating_sub(2));
    unescape_body(framed, |b| {
        out.push(b);
        Ok(())
    })?;
    Ok(out)
}

/// Decode one complete frame into `out`, returning the payload length.
pub fn unframe_into(framed: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
    let max = out.len();
    let mut n = 0;
    unescape_body(framed, |b| {
        let slot = out.get_mut(n).ok_or(CodecError::PayloadTooLarge { max })?;
        *slot = b;
        n += 1;
        Ok(())
    })?;
    Ok(n)
}

/// Additive 16-bit checksum over raw bytes.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

// ── Streaming decoder ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Discarding bytes until `START`.
    Idle,
    /// Collecting payload bytes.
    InFrame,
    /// Previous byte was `ESCAPE`.
    EscapeNext,
}

/// Result of feeding one byte.
#[derive(Debug, PartialEq, Eq)]
pub enum Feed<'a> {
    /// A non-empty frame payload just completed. Valid until the next feed.
    Complete(&'a [u8]),
    NeedMoreData,
}

/// Streaming frame decoder for byte-at-a-time links.
pub struct FrameDecoder {
    state: DecoderState,
    buf: Vec<u8>,
    capacity: usize,
    overruns: u32,
    framing_errors: u32,
    frames: u32,
}

impl FrameDecoder {
    /// Create a decoder that accepts payloads of up to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: DecoderState::Idle,
            buf: Vec::with_capacity(capacity),
            capacity,
            overruns: 0,
            framing_errors: 0,
            frames: 0,
        }
    }

    /// Feed one byte into the decoder.
    pub fn feed(&mut self, byte: u8) -> Feed<'_> {
        match self.state {
            DecoderState::Idle => {
                if byte == START {
                    self.buf.clear();
                    self.state = DecoderState::InFrame;
                }
            }
            DecoderState::InFrame => match byte {
                ESCAPE => self.state = DecoderState::EscapeNext,
                END => {
                    self.state = DecoderState::Idle;
                    if !self.buf.is_empty() {
                        self.frames = self.frames.wrapping_add(1);
                        return Feed::Complete(&self.buf);
                    }
                }
                START => {
                    // Resynchronise: the previous frame lost its END.
                    if !self.buf.is_empty() {
                        self.framing_errors = self.framing_errors.wrapping_add(1);
                    }
                    self.buf.clear();
                }
                b => self.push(b),
            },
            DecoderState::EscapeNext => {
                self.state = DecoderState::InFrame;
                self.push(byte ^ ESCAPE_XOR);
            }
        }
        Feed::NeedMoreData
    }

    /// Feed a chunk, calling `on_frame` for every completed payload.
    /// Returns the number of frames completed.
    pub fn feed_slice(&mut self, data: &[u8], mut on_frame: impl FnMut(&[u8])) -> usize {
        let mut completed = 0;
        for &b in data {
            if let Feed::Complete(payload) = self.feed(b) {
                on_frame(payload);
                completed += 1;
            }
        }
        completed
    }

    fn push(&mut self, b: u8) {
        if self.buf.len() >= self.capacity {
            self.overruns = self.overruns.wrapping_add(1);
            self.buf.clear();
            self.state = DecoderState::Idle;
        } else {
            self.buf.push(b);
        }
    }

    /// Reset decoder state (e.g. after a link restart). Counters are kept.
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.buf.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames discarded because they exceeded the capacity.
    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Partial frames abandoned by a stray `START`.
    pub fn framing_errors(&self) -> u32 {
        self.framing_errors
    }

    /// Frames successfully completed.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Whether the decoder is between frames.
    pub fn is_idle(&self) -> bool {
        self.state == DecoderState::Idle
    }
}
