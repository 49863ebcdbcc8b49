//! Serial transport implementation

use super::{Direction, FlowControl, Parity, StopBits, Transport};
use crate::error::Result;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

/// Serial transport for UART and Bluetooth rfcomm communication.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port.
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/rfcomm0")
    /// * `baud_rate` - Baud rate (e.g., 115200)
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(1000))
            .open()?;

        log::info!("Opened serial port: {} at {} baud", path, baud_rate);

        Ok(SerialTransport { port })
    }
}

impl Transport for SerialTransport {
    fn configure(
        &mut self,
        baud: u32,
        databits: u8,
        parity: Parity,
        stopbits: StopBits,
        flow: FlowControl,
    ) -> Result<()> {
        self.port.set_baud_rate(baud)?;
        self.port.set_data_bits(match databits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        })?;
        self.port.set_parity(match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        })?;
        self.port.set_stop_bits(match stopbits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        })?;
        self.port.set_flow_control(match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
            FlowControl::Software => serialport::FlowControl::Software,
        })?;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let n = self.port.read(buffer)?;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let n = self.port.write(data)?;
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }

    fn purge(&mut self, direction: Direction) -> Result<()> {
        let buffer = match direction {
            Direction::Input => serialport::ClearBuffer::Input,
            Direction::Output => serialport::ClearBuffer::Output,
            Direction::All => serialport::ClearBuffer::All,
        };
        self.port.clear(buffer)?;
        Ok(())
    }
}
