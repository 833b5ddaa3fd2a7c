//! Error types for the acknowledgment protocol.

use std::time::Duration;

use thiserror::Error;

use crate::framer::FramerState;

/// Errors that can occur during a command/acknowledgment exchange.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The transport reported end of stream while a reply was pending.
    #[error("stream closed during read")]
    TransportClosed,

    /// OS-level read or write failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The reply buffer filled up without a sentinel line.
    #[error("reply buffer overflow: no sentinel within {capacity} bytes")]
    Overflow {
        /// Capacity of the reply buffer in bytes.
        capacity: usize,
    },

    /// No sentinel arrived before the deadline.
    #[error("timed out after {waited:?} waiting for a sentinel line")]
    Timeout {
        /// How long the framer waited.
        waited: Duration,
    },

    /// The command text cannot be sent as a single line.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A previous fatal error left the framer unusable until it is reset.
    #[error("framer is unusable after a fatal error (state: {state:?})")]
    Unusable {
        /// The terminal state the framer is latched in.
        state: FramerState,
    },
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
