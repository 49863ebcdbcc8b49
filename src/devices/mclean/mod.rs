//! McLean Extreme backend.
//!
//! Packet format in both directions:
//!
//! ```text
//! 0x7E | 0x00 | u32le(payload_size) | cmd | payload | u16be(crc) | 0x00 0x00
//! ```
//!
//! with an XMODEM CRC-16 over everything between the start byte and the
//! checksum. The device is slow to answer: the packet start byte arrives
//! 6-8 seconds after a request, so the receive path absorbs a bounded
//! number of one-second timeouts, checking for cancellation between
//! retries, instead of configuring one long timeout.

pub mod parser;

use crate::bytes::{crc16_xmodem, u16_be, u32_le};
use crate::config::McleanConfig;
use crate::device::{CancelToken, Device, DeviceBase, DiveCallback, DiveData};
use crate::error::{Error, Result};
use crate::event::{EventSink, Progress};
use crate::transport::{FlowControl, Parity, StopBits, Transport};

/// Fingerprint width: the dive summary prefix.
pub const FINGERPRINT_SIZE: usize = 7;

const STX: u8 = 0x7E;

const CMD_COMPUTER: u8 = 0xA0; // download computer configuration
const CMD_DIVE: u8 = 0xA3; // download one dive's configuration and samples
const CMD_CLOSE: u8 = 0xAA; // close the connection, turn bluetooth off

const SZ_PACKET: usize = 512; // maximum packet payload length
const SZ_COMPUTER: usize = 0x97; // computer state dump
const SZ_DIVE: usize = 0x5E; // dive state dump
const SZ_SAMPLE: usize = 4;

/// Offset of the dive counter in the computer state dump.
const OFF_DIVE_COUNT: usize = 0x19;
/// Offset of the sample counter in a dive state dump.
const OFF_SAMPLE_COUNT: usize = 0x5C;

/// McLean Extreme device handle.
pub struct McleanDevice {
    base: DeviceBase,
    transport: Box<dyn Transport>,
    config: McleanConfig,
    /// Computer state captured during the open handshake.
    computer: [u8; SZ_COMPUTER],
}

impl McleanDevice {
    /// Open the device: configure the line, download the computer state,
    /// and validate its format.
    pub fn open(
        mut transport: Box<dyn Transport>,
        config: McleanConfig,
        events: Option<EventSink>,
    ) -> Result<Self> {
        transport.configure(115200, 8, Parity::None, StopBits::One, FlowControl::None)?;
        transport.set_timeout(std::time::Duration::from_millis(1000))?;

        let mut device = Self {
            base: DeviceBase::new(events),
            transport,
            config,
            computer: [0u8; SZ_COMPUTER],
        };

        device.send(CMD_COMPUTER, &[])?;
        let mut computer = [0u8; SZ_COMPUTER];
        device.receive(CMD_COMPUTER, &mut computer)?;
        if computer[0] != 0 {
            return Err(Error::DataFormat(format!(
                "unsupported device format {}",
                computer[0]
            )));
        }
        device.computer = computer;
        log::info!("McLean Extreme opened, {} dives on device", device.dive_count());
        Ok(device)
    }

    fn dive_count(&self) -> u16 {
        u16::from(self.computer[OFF_DIVE_COUNT])
            | (u16::from(self.computer[OFF_DIVE_COUNT + 1]) << 8)
    }

    /// Send one framed command packet.
    fn send(&mut self, cmd: u8, payload: &[u8]) -> Result<()> {
        self.base.check_cancelled()?;
        if payload.len() > SZ_PACKET {
            return Err(Error::InvalidArgs("payload too large for one packet"));
        }

        let mut packet = Vec::with_capacity(payload.len() + 11);
        packet.push(STX);
        packet.push(0x00);
        packet.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        packet.push(cmd);
        packet.extend_from_slice(payload);
        let crc = crc16_xmodem(&packet[1..], 0);
        packet.extend_from_slice(&crc.to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00]);

        // The computer needs a breather between packets.
        self.transport.sleep(300);
        self.transport.write_all(&packet)
    }

    /// Wait for the packet start byte, absorbing up to the configured
    /// number of timeouts.
    fn await_stx(&mut self) -> Result<()> {
        let mut retries = 0;
        loop {
            let mut byte = [0u8; 1];
            match self.transport.read(&mut byte) {
                Ok(_) if byte[0] == STX => return Ok(()),
                Ok(_) => {
                    // Garbage before the start byte; keep scanning.
                    retries = 0;
                }
                Err(Error::Timeout) => {
                    retries += 1;
                    if retries > self.config.retries {
                        return Err(Error::Timeout);
                    }
                    self.base.check_cancelled()?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Receive one reply packet for `expected`, writing its payload into
    /// `out`. Returns the payload length.
    fn receive(&mut self, expected: u8, out: &mut [u8]) -> Result<usize> {
        self.await_stx()?;

        let mut header = [0u8; 6];
        self.transport.read_exact(&mut header)?;
        if header[0] != 0x00 {
            return Err(Error::Protocol(format!("unexpected type byte {:#04x}", header[0])));
        }
        let length = u32_le(&header[1..]) as usize;
        if length > out.len() {
            return Err(Error::Protocol(format!(
                "payload of {length} bytes exceeds the {} byte buffer",
                out.len()
            )));
        }
        let cmd = header[5];
        if cmd != expected {
            return Err(Error::Protocol(format!(
                "unexpected command byte {cmd:#04x} (wanted {expected:#04x})"
            )));
        }

        // Bulk payload in bounded chunks; the chunk size is a backend
        // parameter because BLE bridges choke on large reads.
        let mut received = 0;
        while received < length {
            let chunk = self.config.chunk_size.min(length - received);
            self.transport.read_exact(&mut out[received..received + chunk])?;
            received += chunk;
        }

        let mut trailer = [0u8; 4];
        self.transport.read_exact(&mut trailer)?;
        let crc = u16_be(&trailer);
        let mut expected_crc = crc16_xmodem(&header, 0);
        expected_crc = crc16_xmodem(&out[..length], expected_crc);
        if crc != expected_crc || trailer[2] != 0 || trailer[3] != 0 {
            return Err(Error::Protocol(format!(
                "checksum mismatch (got {crc:#06x}, computed {expected_crc:#06x})"
            )));
        }
        Ok(length)
    }

    /// Read the sample stream that follows a dive header.
    fn read_samples(&mut self, dive: &mut Vec<u8>, mut remaining: usize) -> Result<()> {
        let mut packet = [0u8; SZ_PACKET];
        while remaining > 0 {
            self.base.check_cancelled()?;
            let length = self.receive(CMD_DIVE, &mut packet)?;
            let count = length / SZ_SAMPLE;
            if count > remaining {
                return Err(Error::DataFormat("too many dive samples received".into()));
            }
            if length != count * SZ_SAMPLE {
                return Err(Error::DataFormat("partial samples received".into()));
            }
            dive.extend_from_slice(&packet[..length]);
            remaining -= count;
        }
        Ok(())
    }
}

impl Device for McleanDevice {
    fn set_fingerprint(&mut self, data: &[u8]) -> Result<()> {
        self.base.set_fingerprint(data, FINGERPRINT_SIZE)
    }

    fn foreach(&mut self, callback: &mut DiveCallback<'_>) -> Result<()> {
        self.base.ensure_open()?;

        let count = self.dive_count();
        let mut progress = Progress { current: 0, maximum: u32::from(count) };
        self.base.emit_progress(&progress);

        // Dive indices count up from the oldest; walk them backwards.
        for index in (0..count).rev() {
            self.base.check_cancelled()?;

            self.send(CMD_DIVE, &index.to_le_bytes())?;
            let mut header = [0u8; SZ_PACKET];
            let length = self.receive(CMD_DIVE, &mut header)?;
            if length < SZ_DIVE {
                return Err(Error::DataFormat("short dive header".into()));
            }
            if header[0] != 0 {
                log::info!("skipping dive {index} with unsupported format {}", header[0]);
                break;
            }

            let samples = usize::from(header[OFF_SAMPLE_COUNT])
                | (usize::from(header[OFF_SAMPLE_COUNT + 1]) << 8);
            let mut dive = Vec::with_capacity(SZ_DIVE + samples * SZ_SAMPLE);
            dive.extend_from_slice(&header[..SZ_DIVE]);
            self.read_samples(&mut dive, samples)?;

            let fingerprint = &dive[..FINGERPRINT_SIZE];
            if self.base.fingerprint_matches(fingerprint) {
                log::debug!("fingerprint match at dive {index}, stopping");
                break;
            }

            let keep_going = callback(DiveData { data: &dive, fingerprint });
            progress.current = u32::from(count - index);
            self.base.emit_progress(&progress);
            if !keep_going {
                break;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.base.mark_closed()?;
        self.send(CMD_CLOSE, &[])
    }

    fn cancel_token(&self) -> CancelToken {
        self.base.cancel_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    /// Frame a reply packet the way the device would.
    pub(super) fn encode_reply(cmd: u8, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![STX, 0x00];
        packet.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        packet.push(cmd);
        packet.extend_from_slice(payload);
        let crc = crc16_xmodem(&packet[1..], 0);
        packet.extend_from_slice(&crc.to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00]);
        packet
    }

    pub(super) fn computer_state(dives: u16) -> [u8; SZ_COMPUTER] {
        let mut state = [0u8; SZ_COMPUTER];
        state[OFF_DIVE_COUNT..OFF_DIVE_COUNT + 2].copy_from_slice(&dives.to_le_bytes());
        state
    }

    fn open_device(mock: &MockTransport, dives: u16) -> McleanDevice {
        mock.inject_read(&encode_reply(CMD_COMPUTER, &computer_state(dives)));
        McleanDevice::open(Box::new(mock.clone()), McleanConfig::default(), None).unwrap()
    }

    #[test]
    fn test_command_wire_format() {
        let mock = MockTransport::new();
        let mut device = open_device(&mock, 0);
        mock.clear_written();

        device.send(CMD_COMPUTER, &[]).unwrap();
        let written = mock.written();
        // 7E 00 00 00 00 00 A0 crc-hi crc-lo 00 00
        assert_eq!(written.len(), 11);
        assert_eq!(&written[..7], &[0x7E, 0x00, 0x00, 0x00, 0x00, 0x00, 0xA0]);
        let crc = crc16_xmodem(&written[1..7], 0);
        assert_eq!(written[7], (crc >> 8) as u8);
        assert_eq!(written[8], (crc & 0xFF) as u8);
        assert_eq!(&written[9..], &[0x00, 0x00]);
    }

    #[test]
    fn test_receive_rejects_bad_crc() {
        let mock = MockTransport::new();
        let mut device = open_device(&mock, 0);

        let mut reply = encode_reply(CMD_DIVE, &[0x01, 0x02]);
        let at = reply.len() - 4;
        reply[at] ^= 0xFF; // corrupt the CRC
        mock.inject_read(&reply);
        let mut out = [0u8; 16];
        assert!(matches!(device.receive(CMD_DIVE, &mut out), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_receive_rejects_wrong_opcode() {
        let mock = MockTransport::new();
        let mut device = open_device(&mock, 0);
        mock.inject_read(&encode_reply(CMD_CLOSE, &[]));
        let mut out = [0u8; 16];
        assert!(matches!(device.receive(CMD_DIVE, &mut out), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_open_rejects_bad_format() {
        let mock = MockTransport::new();
        let mut state = computer_state(0);
        state[0] = 9;
        mock.inject_read(&encode_reply(CMD_COMPUTER, &state));
        let result = McleanDevice::open(Box::new(mock.clone()), McleanConfig::default(), None);
        assert!(matches!(result, Err(Error::DataFormat(_))));
    }

    #[test]
    fn test_foreach_downloads_newest_first() {
        let mock = MockTransport::new();
        let mut device = open_device(&mock, 2);

        // Two dives, each a header with zero samples. Mark them so the
        // delivery order is visible.
        for index in [1u8, 0u8] {
            let mut dive = [0u8; SZ_DIVE];
            dive[1] = index; // lands inside the fingerprint prefix
            mock.inject_read(&encode_reply(CMD_DIVE, &dive));
        }

        let mut order = Vec::new();
        device
            .foreach(&mut |dive| {
                assert_eq!(dive.fingerprint.len(), FINGERPRINT_SIZE);
                order.push(dive.data[1]);
                true
            })
            .unwrap();
        assert_eq!(order, vec![1, 0]);

        // Both requests went to CMD_DIVE with the index payload.
        let written = mock.written();
        assert!(written.windows(7).any(|w| w == [0x7E, 0x00, 0x02, 0x00, 0x00, 0x00, 0xA3]));
    }

    #[test]
    fn test_cancellation_between_retries() {
        let mock = MockTransport::new();
        let mut device = open_device(&mock, 1);
        device.cancel_token().cancel();
        let mut out = [0u8; 16];
        // Nothing injected: the first timeout retry observes the flag.
        assert!(matches!(device.receive(CMD_DIVE, &mut out), Err(Error::Cancelled)));
    }
}
