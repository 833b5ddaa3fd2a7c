//! The command/acknowledgment state machine.
//!
//! Each exchange sends one line and reads reply lines until a sentinel line
//! shows up:
//!
//! ```text
//! Idle --send--> AwaitingSentinel --sentinel--> Resolved
//!                       |---- buffer full ----> Overflow
//!                       |---- end of stream --> Closed
//!                       '---- I/O / deadline -> Failed
//! ```
//!
//! `Overflow`, `Closed` and `Failed` latch: the framer refuses further
//! exchanges until [`AckFramer::reset`] is called, since the conversation
//! with the controller is out of step at that point.

use std::borrow::Cow;
use std::io;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::accumulator::{classification_view, LineAccumulator, DEFAULT_REPLY_CAPACITY};
use crate::commands::{Command, Gcode};
use crate::error::{ProtocolError, ProtocolResult};
use crate::transport::Transport;

/// Largest single read issued to the transport.
const READ_CHUNK: usize = 256;

/// Lines that terminate an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// Command acknowledgment (`ok`).
    Ack,
    /// Startup banner printed after a controller reset (`start`).
    Banner,
}

impl Sentinel {
    /// The token a line has to begin with.
    pub fn token(&self) -> &'static [u8] {
        match self {
            Sentinel::Ack => b"ok",
            Sentinel::Banner => b"start",
        }
    }

    /// Whether the line begins with the token, ignoring case and leading whitespace.
    pub fn matches(&self, line: &[u8]) -> bool {
        let token = self.token();
        let start = line
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(line.len());
        let line = &line[start..];
        line.len() >= token.len() && line[..token.len()].eq_ignore_ascii_case(token)
    }
}

/// What happens to non-sentinel lines received during an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// Drop noise lines as soon as they are complete; the reply holds only the sentinel.
    DiscardNoise,
    /// Keep every line; the reply holds all lines up to and including the sentinel.
    RetainAll,
}

/// Lifecycle state of the framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// No exchange has run yet, or the framer was reset.
    Idle,
    /// A command was sent and the sentinel has not arrived.
    AwaitingSentinel,
    /// The last exchange ended with a sentinel.
    Resolved,
    /// The reply buffer filled up without a sentinel.
    Overflow,
    /// The transport reached end of stream.
    Closed,
    /// A transport error or reply deadline ended the exchange.
    Failed,
}

impl FramerState {
    /// Whether the state refuses new exchanges.
    pub fn is_latched(&self) -> bool {
        matches!(
            self,
            FramerState::Overflow | FramerState::Closed | FramerState::Failed
        )
    }
}

/// Framer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramerConfig {
    /// Reply buffer capacity in bytes.
    ///
    /// In [`ReplyMode::RetainAll`] the whole reply has to fit, so mesh dumps
    /// need a buffer sized for the grid (`bedlevel_mesh::required_capacity`).
    pub capacity: usize,
    /// Overall deadline for one command exchange. `None` blocks indefinitely.
    pub reply_timeout: Option<Duration>,
    /// Drop stale input before each command and before the banner wait.
    pub flush_before_send: bool,
}

impl Default for FramerConfig {
    fn default() -> Self {
        FramerConfig {
            capacity: DEFAULT_REPLY_CAPACITY,
            reply_timeout: None,
            flush_before_send: true,
        }
    }
}

/// The outcome of a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    raw: Bytes,
    sentinel_start: usize,
    noise_lines: usize,
}

impl Reply {
    /// The reply bytes exactly as received, up to and including the sentinel's `\n`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The reply as text; invalid UTF-8 is replaced.
    pub fn payload(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }

    /// The sentinel line, without line terminator.
    pub fn sentinel_line(&self) -> Cow<'_, str> {
        let line = &self.raw[self.sentinel_start..self.raw.len() - 1];
        String::from_utf8_lossy(classification_view(line))
    }

    /// Number of noise lines seen before the sentinel, whether kept or discarded.
    pub fn noise_lines(&self) -> usize {
        self.noise_lines
    }
}

/// How long a read may wait for data.
#[derive(Debug, Clone, Copy)]
enum ReadWait {
    /// Block in `read` until data or end of stream.
    Block,
    /// Wait up to the duration before every read.
    PerRead(Duration),
    /// Wait until an absolute deadline covering the whole exchange.
    Deadline { at: Instant, total: Duration },
}

/// Runs command/acknowledgment exchanges over an owned transport.
#[derive(Debug)]
pub struct AckFramer<T> {
    transport: T,
    config: FramerConfig,
    state: FramerState,
}

impl<T: Transport> AckFramer<T> {
    /// Create a framer with default settings.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, FramerConfig::default())
    }

    /// Create a framer with the given settings.
    pub fn with_config(transport: T, config: FramerConfig) -> Self {
        AckFramer {
            transport,
            config,
            state: FramerState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Active settings.
    pub fn config(&self) -> &FramerConfig {
        &self.config
    }

    /// Access the transport, e.g. to pulse a reset line.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give up the framer and return the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Clear a latched failure after the caller has reset or reopened the link.
    pub fn reset(&mut self) {
        self.state = FramerState::Idle;
    }

    /// Send one command and wait for its `ok`.
    pub fn send(&mut self, command: &Command, mode: ReplyMode) -> ProtocolResult<Reply> {
        self.ensure_usable()?;
        self.flush_input()?;

        debug!(command = %command, "> {}", command);
        self.state = FramerState::AwaitingSentinel;
        if let Err(e) = self.transport.write_all(&command.to_wire()) {
            return Err(self.fail(FramerState::Failed, e.into()));
        }

        let wait = match self.config.reply_timeout {
            Some(total) => ReadWait::Deadline {
                at: Instant::now() + total,
                total,
            },
            None => ReadWait::Block,
        };
        self.exchange(Sentinel::Ack, mode, wait)
    }

    /// Send a typed command, discarding noise.
    pub fn send_gcode(&mut self, gcode: Gcode) -> ProtocolResult<Reply> {
        self.send(&Command::from(gcode), ReplyMode::DiscardNoise)
    }

    /// Send commands in order, stopping at the first failure.
    ///
    /// Returns the number of acknowledged commands.
    pub fn send_all<'a, I>(&mut self, commands: I) -> ProtocolResult<usize>
    where
        I: IntoIterator<Item = &'a Command>,
    {
        let mut sent = 0;
        for command in commands {
            self.send(command, ReplyMode::DiscardNoise)?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Wait for the startup banner the controller prints after a reset.
    ///
    /// Every read is preceded by a wait of up to `timeout` for the link to
    /// become readable. A timeout does not latch the framer, so the caller
    /// may retry the connection attempt.
    pub fn wait_for_banner(&mut self, timeout: Duration) -> ProtocolResult<Reply> {
        self.ensure_usable()?;
        self.flush_input()?;

        debug!(?timeout, "waiting for startup banner");
        self.state = FramerState::AwaitingSentinel;
        match self.exchange(Sentinel::Banner, ReplyMode::DiscardNoise, ReadWait::PerRead(timeout)) {
            Err(ProtocolError::Timeout { waited }) => {
                warn!(?waited, "no startup banner");
                self.state = FramerState::Idle;
                Err(ProtocolError::Timeout { waited })
            }
            other => other,
        }
    }

    fn ensure_usable(&self) -> ProtocolResult<()> {
        if self.state.is_latched() {
            return Err(ProtocolError::Unusable { state: self.state });
        }
        Ok(())
    }

    fn flush_input(&mut self) -> ProtocolResult<()> {
        if self.config.flush_before_send {
            if let Err(e) = self.transport.discard_input() {
                return Err(self.fail(FramerState::Failed, e.into()));
            }
        }
        Ok(())
    }

    fn fail(&mut self, state: FramerState, err: ProtocolError) -> ProtocolError {
        warn!(?state, error = %err, "exchange failed");
        self.state = state;
        err
    }

    /// Block until the transport is readable or the wait expires.
    fn wait_readable(&mut self, wait: ReadWait) -> ProtocolResult<()> {
        let (timeout, waited) = match wait {
            ReadWait::Block => return Ok(()),
            ReadWait::PerRead(timeout) => (timeout, timeout),
            ReadWait::Deadline { at, total } => (at.saturating_duration_since(Instant::now()), total),
        };
        if timeout.is_zero() || !self.transport.poll_readable(timeout)? {
            return Err(ProtocolError::Timeout { waited });
        }
        Ok(())
    }

    fn exchange(
        &mut self,
        sentinel: Sentinel,
        mode: ReplyMode,
        wait: ReadWait,
    ) -> ProtocolResult<Reply> {
        let mut acc = LineAccumulator::new(self.config.capacity);
        let mut chunk = [0u8; READ_CHUNK];
        let mut noise_lines = 0;

        loop {
            if acc.is_full() {
                let err = ProtocolError::Overflow {
                    capacity: acc.capacity(),
                };
                return Err(self.fail(FramerState::Overflow, err));
            }

            if let Err(err) = self.wait_readable(wait) {
                return Err(self.fail(FramerState::Failed, err));
            }

            let want = acc.remaining().min(READ_CHUNK);
            let n = match self.transport.read(&mut chunk[..want]) {
                Ok(0) => return Err(self.fail(FramerState::Closed, ProtocolError::TransportClosed)),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(FramerState::Failed, e.into())),
            };
            acc.feed(&chunk[..n])?;

            while let Some(span) = acc.next_unscanned_line() {
                let line = classification_view(acc.line(span));
                if sentinel.matches(line) {
                    let raw = acc.split_through(span.next());
                    if !acc.is_empty() {
                        trace!(bytes = acc.len(), "dropping bytes after sentinel");
                    }
                    let reply = Reply {
                        raw,
                        sentinel_start: span.start,
                        noise_lines,
                    };
                    debug!(noise_lines, "< {}", reply.sentinel_line());
                    self.state = FramerState::Resolved;
                    return Ok(reply);
                }

                noise_lines += 1;
                trace!("* {}", String::from_utf8_lossy(line));
                if mode == ReplyMode::DiscardNoise {
                    acc.consume_through(span.next());
                }
            }
        }
    }
}
