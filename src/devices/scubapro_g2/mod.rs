//! Scubapro G2 backend (USB HID and BLE GATT).
//!
//! The G2 family answers single-byte commands with length-prefixed
//! packets: every inbound packet starts with a length byte, and outbound
//! commands travel in a fixed-size report whose first byte is the command
//! length. On USB HID the report is preceded by a report-type byte; BLE
//! GATT links (recognized by their small `packet_size`) drop it. Over BLE
//! the link-level pairing passphrase is derived by the transport from six
//! digits of the advertised device name; that happens before this backend
//! ever sees the transport.
//!
//! The device has no per-dive download: `dump` fetches the whole new-data
//! region (everything after the stored timestamp fingerprint), and
//! `foreach` scans the dump backwards for `A5 A5 5A 5A` dive headers.

use crate::bytes::u32_le;
use crate::device::{CancelToken, Device, DeviceBase, DiveCallback, DiveData};
use crate::error::{Error, Result};
use crate::event::{DeviceEvent, EventSink, Progress};
use crate::transport::PacketTransport;

/// Fingerprint width: the dive timestamp.
pub const FINGERPRINT_SIZE: usize = 4;

const RX_PACKET_SIZE: usize = 64;
const TX_PACKET_SIZE: usize = 32;

/// Models sharing this protocol.
pub const ALADIN_SPORT_MATRIX: u8 = 0x17;
pub const ALADIN_SQUARE: u8 = 0x22;
pub const G2: u8 = 0x32;

const CMD_MODEL: u8 = 0x10;
const CMD_SERIAL: u8 = 0x14;
const CMD_DEVTIME: u8 = 0x1A;
const CMD_HANDSHAKE_1: u8 = 0x1B;
const CMD_HANDSHAKE_2: u8 = 0x1C;
const CMD_DATA_LENGTH: u8 = 0xC6;
const CMD_DATA: u8 = 0xC4;

/// Dive header marker in the memory dump.
const DIVE_MARKER: [u8; 4] = [0xA5, 0xA5, 0x5A, 0x5A];

/// Scubapro G2 device handle.
pub struct ScubaproG2Device {
    base: DeviceBase,
    transport: Box<dyn PacketTransport>,
    model: u8,
    /// Timestamp anchor; only dives after it are downloaded.
    timestamp: u32,
}

impl ScubaproG2Device {
    /// Open the device and run the two-stage handshake.
    pub fn open(
        transport: Box<dyn PacketTransport>,
        model: u8,
        events: Option<EventSink>,
    ) -> Result<Self> {
        let mut device =
            Self { base: DeviceBase::new(events), transport, model, timestamp: 0 };
        device.handshake()?;
        log::info!("Scubapro G2 opened (model {model:#04x})");
        Ok(device)
    }

    fn handshake(&mut self) -> Result<()> {
        // The vendor software skips the handshake for the Aladin Sport
        // Matrix; so do we.
        if self.model == ALADIN_SPORT_MATRIX {
            return Ok(());
        }
        let mut answer = [0u8; 1];
        self.transfer(&[CMD_HANDSHAKE_1], &mut answer)?;
        if answer[0] != 0x01 {
            return Err(Error::Protocol(format!("handshake refused ({:#04x})", answer[0])));
        }
        self.transfer(&[CMD_HANDSHAKE_2, 0x10, 0x27, 0x00, 0x00], &mut answer)?;
        if answer[0] != 0x01 {
            return Err(Error::Protocol(format!("handshake refused ({:#04x})", answer[0])));
        }
        Ok(())
    }

    /// Read length-prefixed packets until `answer` is full.
    fn receive(&mut self, answer: &mut [u8], mut progress: Option<&mut Progress>) -> Result<()> {
        let mut remaining = answer.len();
        let mut offset = 0;
        while remaining > 0 {
            self.base.check_cancelled()?;
            let mut packet = [0u8; RX_PACKET_SIZE];
            let transferred = self.transport.packet_read(&mut packet)?;
            if transferred < 1 {
                return Err(Error::Io("empty packet".into()));
            }
            let mut length = usize::from(packet[0]);
            if length >= RX_PACKET_SIZE || transferred < length + 1 {
                return Err(Error::Io(format!(
                    "inconsistent packet (length {length}, transferred {transferred})"
                )));
            }
            if length > remaining {
                log::warn!("receive buffer too small, truncating");
                length = remaining;
            }
            answer[offset..offset + length].copy_from_slice(&packet[1..1 + length]);
            offset += length;
            remaining -= length;

            if let Some(progress) = progress.as_deref_mut() {
                progress.current += length as u32;
                self.base.emit_progress(progress);
            }
        }
        Ok(())
    }

    /// Send one command and collect its fixed-size answer.
    fn transfer(&mut self, command: &[u8], answer: &mut [u8]) -> Result<()> {
        if command.len() > TX_PACKET_SIZE - 1 {
            return Err(Error::InvalidArgs("command too big"));
        }

        let mut report = [0u8; TX_PACKET_SIZE + 1];
        report[0] = 0; // USB HID report type
        report[1] = command.len() as u8;
        report[2..2 + command.len()].copy_from_slice(command);

        // BLE GATT links carry no report-type byte and only the used bytes.
        if self.transport.packet_size() < RX_PACKET_SIZE {
            self.transport.packet_write(&report[1..command.len() + 2])?;
        } else {
            self.transport.packet_write(&report)?;
        }
        self.receive(answer, None)
    }

    fn command_with_timestamp(&self, cmd: u8) -> [u8; 9] {
        let ts = self.timestamp.to_le_bytes();
        [cmd, ts[0], ts[1], ts[2], ts[3], 0x10, 0x27, 0x00, 0x00]
    }
}

impl Device for ScubaproG2Device {
    fn set_fingerprint(&mut self, data: &[u8]) -> Result<()> {
        self.base.set_fingerprint(data, FINGERPRINT_SIZE)?;
        self.timestamp = if data.is_empty() { 0 } else { u32_le(data) };
        Ok(())
    }

    fn dump(&mut self, buffer: &mut Vec<u8>) -> Result<()> {
        self.base.ensure_open()?;

        let mut progress = Progress::default();
        self.base.emit_progress(&progress);

        let mut model = [0u8; 1];
        self.transfer(&[CMD_MODEL], &mut model)?;
        let mut serial = [0u8; 4];
        self.transfer(&[CMD_SERIAL], &mut serial)?;
        let mut devtime = [0u8; 4];
        self.transfer(&[CMD_DEVTIME], &mut devtime)?;

        let systime = chrono::Utc::now().timestamp();
        let devtime = u32_le(&devtime);
        progress.current += 9;
        self.base.emit_progress(&progress);

        self.base.emit(&DeviceEvent::Clock { systime, devtime });
        self.base.emit(&DeviceEvent::DevInfo {
            model: u32::from(model[0]),
            firmware: 0,
            serial: u32_le(&serial),
        });

        let mut answer = [0u8; 4];
        self.transfer(&self.command_with_timestamp(CMD_DATA_LENGTH), &mut answer)?;
        let length = u32_le(&answer);

        progress.maximum = 4 + 9 + if length > 0 { length + 4 } else { 0 };
        progress.current += 4;
        self.base.emit_progress(&progress);

        if length == 0 {
            return Ok(());
        }

        self.transfer(&self.command_with_timestamp(CMD_DATA), &mut answer)?;
        let total = u32_le(&answer);
        progress.current += 4;
        self.base.emit_progress(&progress);
        if total != length + 4 {
            return Err(Error::Protocol(format!(
                "data stream announced {total} bytes for a {length} byte region"
            )));
        }

        let start = buffer.len();
        buffer.resize(start + length as usize, 0);
        self.receive(&mut buffer[start..], Some(&mut progress))
    }

    fn foreach(&mut self, callback: &mut DiveCallback<'_>) -> Result<()> {
        let mut buffer = Vec::new();
        self.dump(&mut buffer)?;
        extract_dives(&buffer, callback)
    }

    fn close(&mut self) -> Result<()> {
        self.base.mark_closed()
    }

    fn cancel_token(&self) -> CancelToken {
        self.base.cancel_token()
    }
}

/// Scan a memory dump backwards for dive headers and deliver each dive.
///
/// Dives are stored oldest-first; the reverse scan yields newest-first.
/// Each header is `A5 A5 5A 5A`, a little-endian length, and the 4-byte
/// timestamp that doubles as the fingerprint.
fn extract_dives(data: &[u8], callback: &mut DiveCallback<'_>) -> Result<()> {
    let mut previous = data.len();
    let mut current = data.len().saturating_sub(4);
    while current > 0 {
        current -= 1;
        if data.len() - current >= 12 && data[current..current + 4] == DIVE_MARKER {
            let length = u32_le(&data[current + 4..]) as usize;
            if length < 12 || current + length > previous {
                return Err(Error::DataFormat("dive length overruns the previous dive".into()));
            }
            let dive = &data[current..current + length];
            let fingerprint = &data[current + 8..current + 12];
            if !callback(DiveData { data: dive, fingerprint }) {
                return Ok(());
            }
            previous = current;
            current = current.saturating_sub(4);
        }
    }
    Ok(())
}
