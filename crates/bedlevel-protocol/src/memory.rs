//! A scripted stand-in for the controller link.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::transport::Transport;

/// An in-memory transport that replays scripted controller output.
///
/// Only built for tests or with the `test-util` feature:
/// - Replies queued with [`MemoryTransport::push_reply`] are handed out by `read`,
///   at most `fragment_size` bytes per call.
/// - Stale input queued with [`MemoryTransport::push_stale`] is read first
///   unless `discard_input` drops it.
/// - Replies queued with [`MemoryTransport::script_reply`] are released one
///   per written line, in order.
/// - With an auto-reply set, every other written line queues that reply.
/// - Once nothing is queued, `read` reports a closed stream.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    stale: VecDeque<u8>,
    pending: VecDeque<u8>,
    written: Vec<u8>,
    script: VecDeque<Vec<u8>>,
    auto_reply: Option<Vec<u8>>,
    fragment_size: Option<usize>,
    read_error: Option<io::ErrorKind>,
    discards: usize,
}

impl MemoryTransport {
    /// Create a transport with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that answers every written line with `reply`.
    pub fn with_auto_reply(reply: &[u8]) -> Self {
        MemoryTransport {
            auto_reply: Some(reply.to_vec()),
            ..Self::default()
        }
    }

    /// Limit every read to at most `size` bytes (minimum 1).
    pub fn set_fragment_size(&mut self, size: usize) {
        self.fragment_size = Some(size.max(1));
    }

    /// Make every subsequent read fail with the given error kind.
    pub fn fail_reads_with(&mut self, kind: io::ErrorKind) {
        self.read_error = Some(kind);
    }

    /// Queue bytes the controller sends in reply.
    pub fn push_reply(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes);
    }

    /// Queue a reply that is released when the next unanswered line is written.
    pub fn script_reply(&mut self, bytes: &[u8]) {
        self.script.push_back(bytes.to_vec());
    }

    /// Queue bytes that are already waiting on the link before a command is sent.
    pub fn push_stale(&mut self, bytes: &[u8]) {
        self.stale.extend(bytes);
    }

    /// Everything written to the transport so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Written bytes split into lines, without terminators.
    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// How many times input was discarded.
    pub fn discard_count(&self) -> usize {
        self.discards
    }

    /// Bytes queued but not read yet.
    pub fn unread_len(&self) -> usize {
        self.stale.len() + self.pending.len()
    }
}

impl Transport for MemoryTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(bytes);
        let lines = bytes.iter().filter(|&&b| b == b'\n').count();
        for _ in 0..lines {
            if let Some(reply) = self.script.pop_front() {
                self.pending.extend(reply);
            } else if let Some(reply) = &self.auto_reply {
                self.pending.extend(reply.iter().copied());
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(kind) = self.read_error {
            return Err(io::Error::new(kind, "scripted read failure"));
        }
        let limit = self.fragment_size.unwrap_or(usize::MAX).min(buf.len());
        let mut n = 0;
        while n < limit {
            let byte = match self.stale.pop_front() {
                Some(b) => b,
                None => match self.pending.pop_front() {
                    Some(b) => b,
                    None => break,
                },
            };
            buf[n] = byte;
            n += 1;
        }
        Ok(n)
    }

    fn poll_readable(&mut self, _timeout: Duration) -> io::Result<bool> {
        Ok(self.unread_len() > 0 || self.read_error.is_some())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.stale.clear();
        self.discards += 1;
        Ok(())
    }
}
