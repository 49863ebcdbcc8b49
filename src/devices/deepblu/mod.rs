//! Deepblu Cosmiq+ backend.
//!
//! The Cosmiq+ speaks an ASCII-hex line protocol over a BLE serial bridge.
//! Command format on the wire:
//!
//! ```text
//! '#' hh(cmd) hh(csum) hh(2*len) hh(data)... '\n'
//! ```
//!
//! Replies use `'$'` in place of `'#'`. The checksum is the two's
//! complement of the modular-8 sum over cmd, encoded length, and data, so
//! summing a whole valid packet gives zero.
//!
//! BLE notifications do not align with lines: the bridge occasionally
//! flushes a packet early, so a line is reassembled from as many reads as
//! it takes to see the terminating newline.

pub mod parser;

use crate::bytes::{hex_decode_byte, hex_encode_byte};
use crate::device::{CancelToken, Device, DeviceBase, DiveCallback, DiveData};
use crate::error::{Error, Result};
use crate::event::{EventSink, Progress};
use crate::transport::Transport;

/// Fingerprint width: the first eight header bytes of a dive.
pub const FINGERPRINT_SIZE: usize = 8;

/// Maximum decoded payload per packet. BLE notifications cap the line at 20
/// bytes, which leaves 6 data bytes after framing and hex doubling, but the
/// protocol permits up to this much in one line.
const MAX_DATA: usize = 20;

/// Dive header size; profile samples follow it.
const HEADER_SIZE: usize = 256;

// Command opcodes.
const CMD_DIVE_COUNT: u8 = 0xA0;
const CMD_DIVE_HEADER: u8 = 0xA1;
const CMD_DIVE_PROFILE: u8 = 0xA2;

/// Deepblu Cosmiq+ device handle.
pub struct DeepbluDevice {
    base: DeviceBase,
    transport: Box<dyn Transport>,
}

impl DeepbluDevice {
    pub fn open(mut transport: Box<dyn Transport>, events: Option<EventSink>) -> Result<Self> {
        transport.set_timeout(std::time::Duration::from_millis(1000))?;
        log::info!("Deepblu Cosmiq+ opened");
        Ok(Self { base: DeviceBase::new(events), transport })
    }

    /// Send one command packet.
    fn send_cmd(&mut self, cmd: u8, data: &[u8]) -> Result<()> {
        if data.len() > MAX_DATA {
            return Err(Error::InvalidArgs("payload too large for one packet"));
        }
        let encoded_len = (data.len() * 2) as u8;
        let csum = (cmd
            .wrapping_add(encoded_len)
            .wrapping_add(data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))))
        .wrapping_neg();

        let mut line = Vec::with_capacity(8 + 2 * data.len());
        line.push(b'#');
        line.extend_from_slice(&hex_encode_byte(cmd));
        line.extend_from_slice(&hex_encode_byte(csum));
        line.extend_from_slice(&hex_encode_byte(encoded_len));
        for &byte in data {
            line.extend_from_slice(&hex_encode_byte(byte));
        }
        line.push(b'\n');
        self.transport.write_all(&line)
    }

    /// Reassemble one newline-terminated reply line, stripping the newline.
    ///
    /// The write position is tracked explicitly and the newline check looks
    /// at the last byte actually written, so a short or empty first read
    /// cannot index before the buffer.
    fn recv_line(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        loop {
            self.base.check_cancelled()?;
            if filled == buffer.len() {
                return Err(Error::Io("reply line longer than buffer".into()));
            }
            let n = self.transport.read(&mut buffer[filled..])?;
            if n == 0 {
                return Err(Error::Io("empty reply packet".into()));
            }
            filled += n;
            if buffer[filled - 1] == b'\n' {
                return Ok(filled - 1);
            }
        }
    }

    /// Receive a reply packet for `expected`, decoding its payload into
    /// `out`. Returns the decoded byte count.
    fn recv_data(&mut self, expected: u8, out: &mut [u8]) -> Result<usize> {
        let mut line = [0u8; 8 + 2 * MAX_DATA];
        let len = self.recv_line(&mut line)?;
        let line = &line[..len];

        // '$' plus three hex header bytes is the minimum valid reply.
        if len < 7 || line[0] != b'$' {
            return Err(Error::Io("invalid reply framing".into()));
        }
        let cmd = hex_decode_byte(line[1], line[2])
            .ok_or_else(|| Error::Io("non-hex reply header".into()))?;
        let csum = hex_decode_byte(line[3], line[4])
            .ok_or_else(|| Error::Io("non-hex reply header".into()))?;
        let ndata = hex_decode_byte(line[5], line[6])
            .ok_or_else(|| Error::Io("non-hex reply header".into()))? as usize;

        if ndata % 2 != 0 || ndata != len - 7 {
            return Err(Error::Io(format!(
                "reply length mismatch (claimed {ndata}, got {})",
                len - 7
            )));
        }
        if ndata / 2 > out.len() {
            return Err(Error::Io("reply too big for buffer".into()));
        }

        let mut sum = cmd.wrapping_add(csum).wrapping_add(ndata as u8);
        for (slot, pair) in out.iter_mut().zip(line[7..].chunks_exact(2)) {
            let byte = hex_decode_byte(pair[0], pair[1])
                .ok_or_else(|| Error::Io("non-hex reply data".into()))?;
            *slot = byte;
            sum = sum.wrapping_add(byte);
        }
        if sum != 0 {
            return Err(Error::Protocol(format!("reply checksum residue {sum:#04x}")));
        }
        if cmd != expected {
            return Err(Error::Protocol(format!(
                "unexpected reply opcode {cmd:#04x} (wanted {expected:#04x})"
            )));
        }
        Ok(ndata / 2)
    }

    /// Round-trip one command, expecting a reply with the same opcode.
    fn transfer(&mut self, cmd: u8, data: &[u8], out: &mut [u8]) -> Result<usize> {
        self.base.check_cancelled()?;
        self.send_cmd(cmd, data)?;
        self.recv_data(cmd, out)
    }

    /// Download one dive: the fixed-size header, then profile packets until
    /// the device sends an empty one.
    fn download_dive(&mut self, number: u8) -> Result<Vec<u8>> {
        let mut dive = Vec::with_capacity(HEADER_SIZE);
        let mut chunk = [0u8; MAX_DATA];

        while dive.len() < HEADER_SIZE {
            let n = self.transfer(CMD_DIVE_HEADER, &[number], &mut chunk)?;
            if n == 0 {
                return Err(Error::Io("dive header ended early".into()));
            }
            dive.extend_from_slice(&chunk[..n]);
        }
        if dive.len() != HEADER_SIZE {
            return Err(Error::DataFormat("dive header overran its size".into()));
        }

        loop {
            self.base.check_cancelled()?;
            let n = self.transfer(CMD_DIVE_PROFILE, &[number], &mut chunk)?;
            if n == 0 {
                break;
            }
            dive.extend_from_slice(&chunk[..n]);
        }
        Ok(dive)
    }
}

impl Device for DeepbluDevice {
    fn set_fingerprint(&mut self, data: &[u8]) -> Result<()> {
        self.base.set_fingerprint(data, FINGERPRINT_SIZE)
    }

    fn foreach(&mut self, callback: &mut DiveCallback<'_>) -> Result<()> {
        self.base.ensure_open()?;

        let mut reply = [0u8; MAX_DATA];
        let n = self.transfer(CMD_DIVE_COUNT, &[], &mut reply)?;
        if n < 1 {
            return Err(Error::Io("empty dive count reply".into()));
        }
        let count = u32::from(reply[0]);

        let mut progress = Progress { current: 0, maximum: count };
        self.base.emit_progress(&progress);

        // Dive 0 is the most recent.
        for number in 0..count {
            self.base.check_cancelled()?;
            let dive = self.download_dive(number as u8)?;
            let fingerprint = &dive[..FINGERPRINT_SIZE];
            if self.base.fingerprint_matches(fingerprint) {
                log::debug!("fingerprint match at dive {number}, stopping");
                break;
            }
            let keep_going = callback(DiveData { data: &dive, fingerprint });
            progress.current += 1;
            self.base.emit_progress(&progress);
            if !keep_going {
                break;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.base.mark_closed()?;
        self.transport.flush()
    }

    fn cancel_token(&self) -> CancelToken {
        self.base.cancel_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn device_over(mock: &MockTransport) -> DeepbluDevice {
        DeepbluDevice::open(Box::new(mock.clone()), None).unwrap()
    }

    /// Encode a reply line the way the device would.
    fn encode_reply(cmd: u8, data: &[u8]) -> Vec<u8> {
        let encoded_len = (data.len() * 2) as u8;
        let csum = (cmd
            .wrapping_add(encoded_len)
            .wrapping_add(data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))))
        .wrapping_neg();
        let mut line = vec![b'$'];
        line.extend_from_slice(&hex_encode_byte(cmd));
        line.extend_from_slice(&hex_encode_byte(csum));
        line.extend_from_slice(&hex_encode_byte(encoded_len));
        for &byte in data {
            line.extend_from_slice(&hex_encode_byte(byte));
        }
        line.push(b'\n');
        line
    }

    #[test]
    fn test_send_cmd_wire_format() {
        let mock = MockTransport::new();
        let mut device = device_over(&mock);
        device.send_cmd(0xA0, &[]).unwrap();
        // csum = -(0xA0 + 0) = 0x60
        assert_eq!(mock.written(), b"#A06000\n");
    }

    #[test]
    fn test_recv_data_decodes_valid_reply() {
        let mock = MockTransport::new();
        mock.inject_read(&encode_reply(0xA0, &[0x01, 0x23, 0x45]));
        let mut device = device_over(&mock);
        let mut out = [0u8; MAX_DATA];
        let n = device.recv_data(0xA0, &mut out).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[0x01, 0x23, 0x45]);
    }

    #[test]
    fn test_recv_data_across_split_packets() {
        let mock = MockTransport::new();
        let reply = encode_reply(0xA0, &[0xAB]);
        // The BLE bridge may flush mid-line.
        mock.inject_read(&reply[..4]);
        mock.inject_read(&reply[4..]);
        let mut device = device_over(&mock);
        let mut out = [0u8; MAX_DATA];
        assert_eq!(device.recv_data(0xA0, &mut out).unwrap(), 1);
        assert_eq!(out[0], 0xAB);
    }

    #[test]
    fn test_recv_data_rejects_bad_checksum() {
        let mock = MockTransport::new();
        let mut reply = encode_reply(0xA0, &[0x01]);
        // Corrupt the data byte without fixing the checksum.
        let at = reply.len() - 3;
        reply[at] = b'F';
        reply[at + 1] = b'F';
        mock.inject_read(&reply);
        let mut device = device_over(&mock);
        let mut out = [0u8; MAX_DATA];
        assert!(matches!(device.recv_data(0xA0, &mut out), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_recv_data_rejects_length_mismatch() {
        let mock = MockTransport::new();
        // Claims 4 hex chars of data but carries 2.
        mock.inject_read(b"$A05C0412\n");
        let mut device = device_over(&mock);
        let mut out = [0u8; MAX_DATA];
        assert!(matches!(device.recv_data(0xA0, &mut out), Err(Error::Io(_))));
    }
}
