//! # bedlevel-cli
//!
//! Library side of the `bedlevel` tool: configuration, the serial transport
//! and the [`Machine`] session that drives a controller through the
//! acknowledgment protocol.

mod config;
mod error;
mod machine;
mod serial;

pub use config::{AxisLimits, Config, MachineConfig, MeshConfig, ProtocolConfig, SerialConfig};
pub use error::{CliError, CliResult};
pub use machine::{Machine, Position, Target};
pub use serial::SerialTransport;

use std::thread;

use bedlevel_protocol::AckFramer;
use tracing::info;

/// Open the serial link and bring the controller to a known state.
///
/// With `reset`, the controller is restarted and its startup banner awaited.
/// Otherwise the configured settle time is slept.
pub fn connect(config: &Config, reset: bool) -> CliResult<Machine<SerialTransport>> {
    let mut transport = SerialTransport::open(&config.serial)?;
    if reset {
        transport.pulse_reset()?;
    }

    let framer = AckFramer::with_config(transport, config.framer_config()?);
    let mut machine = Machine::new(framer, config.machine.clone());

    if reset {
        machine.wait_for_banner(config.protocol.banner_timeout()?)?;
    } else {
        let settle = config.serial.settle_time()?;
        if !settle.is_zero() {
            info!(?settle, "waiting for controller to settle");
            thread::sleep(settle);
        }
    }
    Ok(machine)
}
