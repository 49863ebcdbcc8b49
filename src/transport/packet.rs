//! Packet-granular transport for BLE GATT and USB HID links.

use crate::error::Result;

/// A transport that moves whole packets instead of a byte stream.
///
/// `packet_size` is the fixed link MTU: 64 for USB HID interrupt transfers,
/// typically 20 for BLE GATT notifications. Protocol code branches on it to
/// decide framing (e.g., whether a report-type byte is present).
pub trait PacketTransport {
    /// Fixed packet size of the link in bytes.
    fn packet_size(&self) -> usize;

    /// Read one packet into `buffer`, returning its length.
    fn packet_read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write one packet, returning the number of bytes accepted.
    fn packet_write(&mut self, data: &[u8]) -> Result<usize>;
}
