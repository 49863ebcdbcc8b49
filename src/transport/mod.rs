//! Transport layer for I/O abstraction
//!
//! Devices drive an already-connected byte transport through the
//! [`Transport`] trait; packet-granular transports (BLE GATT, USB HID)
//! additionally implement [`PacketTransport`]. Implementations are supplied
//! by the embedding application; this crate ships a serial implementation
//! and a mock for tests.

use crate::error::{Error, Result};
use std::time::Duration;

#[cfg(feature = "serial")]
mod serial;
#[cfg(feature = "serial")]
pub use serial::SerialTransport;

mod mock;
pub use mock::{MockPacketTransport, MockTransport};

mod packet;
pub use packet::PacketTransport;

/// The parity checking scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// The number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// The flow control scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Hardware,
    Software,
}

/// The direction of a purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
    All,
}

/// Synchronous byte transport with a per-read timeout.
///
/// `read` returns `Error::Timeout` when no byte arrives in time; protocol
/// retry loops rely on that distinction to keep polling slow devices while
/// checking for cancellation.
pub trait Transport {
    /// Configure line parameters. Transports without a line (BLE, mock)
    /// accept and ignore this.
    fn configure(
        &mut self,
        baud: u32,
        databits: u8,
        parity: Parity,
        stopbits: StopBits,
        flow: FlowControl,
    ) -> Result<()>;

    /// Set the per-read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Read into `buffer`, returning the number of bytes read (at least 1),
    /// or `Error::Timeout`.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write from `data`, returning the number of bytes written.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush pending writes to the device.
    fn flush(&mut self) -> Result<()>;

    /// Discard buffered data in the given direction.
    fn purge(&mut self, direction: Direction) -> Result<()>;

    /// Block for `ms` milliseconds. On the transport so that mocks can make
    /// protocol-mandated delays instantaneous.
    fn sleep(&mut self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }

    /// Read exactly `buffer.len()` bytes or fail.
    fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        let mut offset = 0;
        while offset < buffer.len() {
            let n = self.read(&mut buffer[offset..])?;
            if n == 0 {
                return Err(Error::Io("transport returned no data".into()));
            }
            offset += n;
        }
        Ok(())
    }

    /// Write all of `data` or fail.
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let n = self.write(&data[offset..])?;
            if n == 0 {
                return Err(Error::Io("transport accepted no data".into()));
            }
            offset += n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_exact_assembles_partial_reads() {
        let mock = MockTransport::new();
        mock.inject_read(b"abc");
        mock.inject_read(b"def");
        let mut transport = mock.clone();
        let mut buffer = [0u8; 6];
        transport.read_exact(&mut buffer).unwrap();
        assert_eq!(&buffer, b"abcdef");
    }

    #[test]
    fn test_read_exact_times_out_when_short() {
        let mock = MockTransport::new();
        mock.inject_read(b"ab");
        let mut transport = mock.clone();
        let mut buffer = [0u8; 4];
        assert!(matches!(transport.read_exact(&mut buffer), Err(Error::Timeout)));
    }
}
