//! Fixed-capacity line buffers.
//!
//! Grounded on spec.md §4.1: an 8 KiB input buffer and a 64 KiB output
//! buffer, with synchronous, non-blocking overflow reporting (the original
//! C core's `-ENOBUFS`).

use crate::error::SendError;

pub const INPUT_CAPACITY: usize = 8 * 1024;
pub const OUTPUT_CAPACITY: usize = 64 * 1024;
pub const MAX_LINE_LEN: usize = 512;

/// Accumulates raw bytes read off the wire and yields complete `\r\n`-
/// terminated lines.
#[derive(Debug, Default)]
pub struct InputBuffer {
    pending: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputOverflow {
    #[error("input buffer exceeded {INPUT_CAPACITY} bytes without a line terminator")]
    Overflow,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed freshly-read bytes in, draining complete lines into `out` (sans
    /// the trailing `\r\n`). Returns an error if the unterminated remainder
    /// would exceed [`INPUT_CAPACITY`]; the buffer is left unchanged so the
    /// caller can tear the connection down without double-accounting.
    pub fn feed(&mut self, data: &[u8], out: &mut Vec<String>) -> Result<(), InputOverflow> {
        if self.pending.len() + data.len() > INPUT_CAPACITY {
            return Err(InputOverflow::Overflow);
        }
        self.pending.extend_from_slice(data);

        loop {
            let Some(pos) = self.pending.windows(2).position(|w| w == b"\r\n") else {
                break;
            };
            let line = self.pending.drain(..pos + 2).collect::<Vec<u8>>();
            let line = &line[..line.len() - 2];
            out.push(String::from_utf8_lossy(line).into_owned());
        }
        Ok(())
    }
}

/// Accumulates formatted lines awaiting a write to the socket.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    pending: Vec<u8>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `line` (without `\r\n`) to the buffer. Rejected without
    /// mutation if the line is too long or the buffer is already full.
    pub fn push_line(&mut self, line: &str) -> Result<(), SendError> {
        if line.len() > MAX_LINE_LEN - 2 {
            return Err(SendError::BufferFull);
        }
        if self.pending.len() + line.len() + 2 > OUTPUT_CAPACITY {
            return Err(SendError::BufferFull);
        }
        self.pending.extend_from_slice(line.as_bytes());
        self.pending.extend_from_slice(b"\r\n");
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pending
    }

    pub fn consume(&mut self, n: usize) {
        self.pending.drain(..n);
    }
}
