//! Frame scanning and encoding.
//!
//! Wire format:
//! ```text
//! '<' FIELD { ',' FIELD } '>'
//! ```
//!
//! ASCII text, no escaping, no checksum, no length prefix. A literal `<` or
//! `>` inside a field cannot be told apart from a delimiter; sensor firmware
//! depends on this exact framing, so none is added here.

use crate::codec;

pub const START: u8 = b'<';
pub const END: u8 = b'>';

/// The text between a `<` and its closing `>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub content: String,
}

impl RawFrame {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Comma-separated fields; the first one is the message tag.
    pub fn fields(&self) -> Vec<&str> {
        codec::split_fields(&self.content)
    }

    /// Encode as `'<' + content + '>'`.
    pub fn encode(&self) -> Vec<u8> {
        encode_frame(&self.content)
    }
}

/// Wrap `content` in frame delimiters. No escaping is applied.
pub fn encode_frame(content: &str) -> Vec<u8> {
    let mut wire = Vec::with_capacity(content.len() + 2);
    wire.push(START);
    wire.extend_from_slice(content.as_bytes());
    wire.push(END);
    wire
}

/// Splits a byte stream into frames. Buffers partial data across calls, so it
/// can be fed whatever chunk sizes the transport delivers.
///
/// Bytes outside a frame are dropped. A `<` seen mid-frame throws away the
/// partial frame and starts over.
#[derive(Debug)]
pub struct FrameSplitter {
    in_frame: bool,
    buf: Vec<u8>,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self {
            in_frame: false,
            buf: Vec::with_capacity(128),
        }
    }

    /// Feed new data and extract any complete frames, in arrival order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<RawFrame> {
        let mut frames = Vec::new();

        for &b in data {
            match b {
                START => {
                    if self.in_frame && !self.buf.is_empty() {
                        log::debug!("frame restarted, dropping {} buffered bytes", self.buf.len());
                    }
                    self.in_frame = true;
                    self.buf.clear();
                }
                END if self.in_frame => {
                    self.in_frame = false;
                    // Latin-1 widening keeps every byte, valid UTF-8 or not.
                    let content: String = self.buf.iter().map(|&c| c as char).collect();
                    self.buf.clear();
                    frames.push(RawFrame { content });
                }
                _ if self.in_frame => self.buf.push(b),
                _ => {}
            }
        }

        frames
    }

    /// True while between a `<` and its `>`.
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.in_frame = false;
        self.buf.clear();
    }
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
