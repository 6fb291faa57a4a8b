//! Newline-delimited frame codec.
//!
//! Wire format:
//! ```text
//! ┌──────────────────────────┬──────┐
//! │ JSON document (N B)      │ '\n' │
//! └──────────────────────────┴──────┘
//! ```
//!
//! The decoder accumulates incoming bytes and yields complete lines.
//! A single read may carry part of a line, or several lines at once.

use heapless::Vec;
use serde::Serialize;

use crate::error::ProtocolError;

/// Maximum line length, excluding the newline.
pub const MAX_FRAME_SIZE: usize = 1024;

/// One complete line, newline and trailing `\r` stripped.
pub type Frame = Vec<u8, MAX_FRAME_SIZE>;

/// Streaming line decoder.
pub struct LineDecoder {
    buf: Vec<u8, MAX_FRAME_SIZE>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed bytes into the decoder, pushing every completed line onto
    /// `out`.  Blank lines are skipped.
    ///
    /// A line longer than [`MAX_FRAME_SIZE`] is a framing error; the
    /// connection is not recoverable after that.
    pub fn feed(&mut self, data: &[u8], out: &mut std::vec::Vec<Frame>) -> Result<(), ProtocolError> {
        for &byte in data {
            if byte == b'\n' {
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
                if !self.buf.iter().all(u8::is_ascii_whitespace) {
                    out.push(self.buf.clone());
                }
                self.buf.clear();
            } else if self.buf.push(byte).is_err() {
                self.buf.clear();
                return Err(ProtocolError::Framing);
            }
        }
        Ok(())
    }

    /// Bytes of an incomplete line currently held.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Reset decoder state (e.g. after a reconnect).
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize `value` as one newline-terminated JSON line.
pub fn encode_line(value: &impl Serialize) -> Result<std::vec::Vec<u8>, ProtocolError> {
    let mut line = serde_json::to_vec(value).map_err(|_| ProtocolError::Json)?;
    line.push(b'\n');
    Ok(line)
}
