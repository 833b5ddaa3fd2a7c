//! G-code Command/Acknowledgment Protocol
//!
//! This crate drives a 3D-printer style motion controller over a byte stream
//! (usually a serial link) using the line-oriented acknowledgment protocol
//! spoken by Marlin, Teacup and similar firmware.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → controller): one line of text terminated with `\n`
//! - **Acknowledgment** (controller → host): a line beginning with `ok`
//!   (case-insensitive) that ends the exchange
//! - **Noise**: any other line (echo, busy notices, temperature reports,
//!   multi-line reports) received before the acknowledgment
//! - **Banner**: after a reset the controller prints an unsolicited line
//!   beginning with `start`
//!
//! One command is in flight at a time. A missing acknowledgment is fatal;
//! nothing is retried here.
//!
//! # Example
//!
//! ```rust,ignore
//! use bedlevel_protocol::{AckFramer, Command, Gcode, ReplyMode};
//!
//! let mut framer = AckFramer::new(serial);
//! framer.wait_for_banner(Duration::from_secs(10))?;
//! framer.send_gcode(Gcode::Home(Axes::ALL))?;
//!
//! // Multi-line reports keep every line up to the `ok`
//! let reply = framer.send(&Gcode::MeshReport.into(), ReplyMode::RetainAll)?;
//! println!("{}", reply.payload());
//! ```

mod accumulator;
mod commands;
mod error;
mod framer;
#[cfg(any(test, feature = "test-util"))]
mod memory;
mod transport;

pub use accumulator::*;
pub use commands::*;
pub use error::*;
pub use framer::*;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryTransport;
pub use transport::*;
