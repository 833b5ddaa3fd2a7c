//! The byte-stream boundary between the framer and the controller link.
//!
//! Opening, configuring and resetting the physical link is the caller's job;
//! the framer only needs to write lines and read reply bytes.

use std::io;
use std::time::Duration;

/// A duplex byte stream to the motion controller.
pub trait Transport {
    /// Write all bytes to the link.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read available bytes into `buf`.
    ///
    /// Blocks until at least one byte is available. Returns `Ok(0)` when the
    /// stream has been closed. Short reads are allowed.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Wait up to `timeout` for the stream to become readable.
    ///
    /// Returns `Ok(false)` on timeout. Transports without readiness
    /// notification report readable immediately and let `read` block.
    fn poll_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let _ = timeout;
        Ok(true)
    }

    /// Drop input that was received but not read yet.
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn poll_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        (**self).poll_readable(timeout)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn poll_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        (**self).poll_readable(timeout)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }
}
