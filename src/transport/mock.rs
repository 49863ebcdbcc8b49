//! Mock transports for testing

use super::{Direction, FlowControl, PacketTransport, Parity, StopBits, Transport};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock byte transport for unit testing.
///
/// Reads drain a pre-injected buffer; an empty buffer reads as a timeout,
/// which is what a real transport reports when the device goes quiet.
/// `sleep` is a no-op so protocol-mandated delays cost nothing in tests.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
            })),
        }
    }

    /// Inject data to be read.
    pub fn inject_read(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.read_buffer.extend(data);
    }

    /// Get all written data.
    pub fn written(&self) -> Vec<u8> {
        let inner = self.inner.lock().unwrap();
        inner.write_buffer.clone()
    }

    /// Clear written data.
    pub fn clear_written(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.write_buffer.clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn configure(
        &mut self,
        _baud: u32,
        _databits: u8,
        _parity: Parity,
        _stopbits: StopBits,
        _flow: FlowControl,
    ) -> Result<()> {
        Ok(())
    }

    fn set_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if inner.read_buffer.is_empty() {
            return Err(Error::Timeout);
        }
        let available = inner.read_buffer.len().min(buffer.len());
        for slot in buffer.iter_mut().take(available) {
            *slot = inner.read_buffer.pop_front().unwrap();
        }
        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.write_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn purge(&mut self, direction: Direction) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if matches!(direction, Direction::Input | Direction::All) {
            inner.read_buffer.clear();
        }
        if matches!(direction, Direction::Output | Direction::All) {
            inner.write_buffer.clear();
        }
        Ok(())
    }

    fn sleep(&mut self, _ms: u64) {}
}

/// Mock packet transport: a queue of inbound packets plus a write log.
#[derive(Clone)]
pub struct MockPacketTransport {
    inner: Arc<Mutex<MockPacketInner>>,
    packet_size: usize,
}

struct MockPacketInner {
    read_packets: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
}

impl MockPacketTransport {
    pub fn new(packet_size: usize) -> Self {
        MockPacketTransport {
            inner: Arc::new(Mutex::new(MockPacketInner {
                read_packets: VecDeque::new(),
                written: Vec::new(),
            })),
            packet_size,
        }
    }

    /// Queue one inbound packet.
    pub fn inject_packet(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.read_packets.push_back(data.to_vec());
    }

    /// All packets written so far.
    pub fn written_packets(&self) -> Vec<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.written.clone()
    }
}

impl PacketTransport for MockPacketTransport {
    fn packet_size(&self) -> usize {
        self.packet_size
    }

    fn packet_read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let packet = inner.read_packets.pop_front().ok_or(Error::Timeout)?;
        let n = packet.len().min(buffer.len());
        buffer[..n].copy_from_slice(&packet[..n]);
        Ok(n)
    }

    fn packet_write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.written.push(data.to_vec());
        Ok(data.len())
    }
}
