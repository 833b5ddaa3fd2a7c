//! Serial link to the controller.

use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use bedlevel_protocol::Transport;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::config::SerialConfig;
use crate::error::CliResult;

/// Read timeout of the underlying port. Blocking reads retry past it.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Interval between input checks while polling for readability.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long DTR is held low to restart the controller.
const RESET_PULSE: Duration = Duration::from_millis(100);

/// A [`Transport`] over an 8N1 serial port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open the configured port.
    pub fn open(config: &SerialConfig) -> CliResult<Self> {
        info!(port = %config.port, baud = config.baud_rate, "opening serial port");
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;
        Ok(SerialTransport { port })
    }

    /// Restart the controller by pulsing DTR.
    pub fn pulse_reset(&mut self) -> CliResult<()> {
        debug!("pulsing DTR");
        self.port.write_data_terminal_ready(false)?;
        thread::sleep(RESET_PULSE);
        self.port.write_data_terminal_ready(true)?;
        Ok(())
    }

    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.port.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                other => return other,
            }
        }
    }

    fn poll_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.port.bytes_to_read()? > 0 {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
