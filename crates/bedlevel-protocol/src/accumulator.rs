//! Incremental line assembly for controller replies.
//!
//! Replies arrive as arbitrary chunks from the transport. The accumulator
//! appends them to a bounded buffer and hands out the byte spans of complete
//! `\n`-terminated lines, one at a time, without copying them:
//!
//! ```text
//! buffer:  b"echo:busy\nok\npartial"
//!            ^         ^   ^
//!            0         |   cursor after two lines
//!                      first line ends here (exclusive of '\n')
//! ```
//!
//! Bytes behind the cursor have been handed out already. They stay in the
//! buffer until [`LineAccumulator::consume_through`] compacts them away.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Default reply buffer capacity in bytes.
///
/// Enough for acknowledgments and short diagnostic chatter. Mesh dumps need
/// more; size the buffer from the grid dimensions for those.
pub const DEFAULT_REPLY_CAPACITY: usize = 1000;

/// The location of one complete line inside the accumulator buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    /// Offset of the first byte of the line.
    pub start: usize,
    /// Offset of the terminating `\n` (the line content is `start..end`).
    pub end: usize,
}

impl LineSpan {
    /// Offset just past the terminating `\n`.
    pub fn next(&self) -> usize {
        self.end + 1
    }

    /// Length of the line content, without the `\n`.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the line has no content (two consecutive `\n`).
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A bounded byte buffer that discovers newline-terminated lines.
///
/// Invariant: `cursor <= len <= capacity`.
#[derive(Debug)]
pub struct LineAccumulator {
    /// Bytes received so far for the current exchange.
    buffer: BytesMut,
    /// Maximum number of bytes the buffer may hold.
    capacity: usize,
    /// Offset up to which lines have been handed out.
    cursor: usize,
}

impl LineAccumulator {
    /// Create an empty accumulator holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        LineAccumulator {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    /// Maximum number of bytes the buffer may hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Free space left before the capacity is reached.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    /// Whether the buffer has reached its capacity.
    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    /// Offset up to which lines have been handed out.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The buffered bytes, including lines already handed out.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Append a received chunk.
    ///
    /// Fails with [`ProtocolError::Overflow`] without modifying the buffer if
    /// the chunk does not fit.
    pub fn feed(&mut self, chunk: &[u8]) -> ProtocolResult<()> {
        if chunk.len() > self.remaining() {
            return Err(ProtocolError::Overflow {
                capacity: self.capacity,
            });
        }
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    /// Find the next complete line after the cursor and move the cursor past it.
    ///
    /// Returns `None` when the unscanned region holds no `\n` yet; feed more
    /// bytes and ask again.
    pub fn next_unscanned_line(&mut self) -> Option<LineSpan> {
        let pos = self.buffer[self.cursor..].iter().position(|&b| b == b'\n')?;
        let span = LineSpan {
            start: self.cursor,
            end: self.cursor + pos,
        };
        self.cursor = span.next();
        Some(span)
    }

    /// The raw content of a line, excluding its `\n` but including any `\r`.
    pub fn line(&self, span: LineSpan) -> &[u8] {
        &self.buffer[span.start..span.end]
    }

    /// Drop bytes `[0, end)` and shift the rest to the front of the buffer.
    pub fn consume_through(&mut self, end: usize) {
        let n = end.min(self.buffer.len());
        self.buffer.advance(n);
        self.cursor = self.cursor.saturating_sub(n);
    }

    /// Take bytes `[0, end)` out of the buffer as an immutable payload.
    pub fn split_through(&mut self, end: usize) -> Bytes {
        let n = end.min(self.buffer.len());
        let payload = self.buffer.split_to(n).freeze();
        self.cursor = self.cursor.saturating_sub(n);
        payload
    }

    /// Discard everything and rewind the cursor.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }
}

/// The part of a line that takes part in classification.
///
/// A `\r` right before the `\n` is not data-significant and is dropped here;
/// the buffer itself keeps it.
pub fn classification_view(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
