//! Error types for sagara-io
//!
//! # Error Recovery Strategies
//!
//! Different error classes call for different recovery approaches:
//!
//! ## Transient (Retry Recommended)
//!
//! - **`Timeout`**: The transport did not deliver data within its configured
//!   timeout. Protocol loops that expect slow devices absorb a bounded number
//!   of these and retry; anything that escapes a retry loop is a real failure.
//!
//! ## Fatal for the Current Operation (Reconnect)
//!
//! - **`Protocol`**: Checksum mismatch, unexpected opcode, or framing
//!   violation. There is no resync protocol; close the device and reopen.
//! - **`Io`**: Transport failure or malformed incoming bytes. Dives already
//!   delivered to the callback remain valid.
//! - **`Nack`**: The device refused a transfer at the link level.
//!
//! ## Caller Errors (Fix the Call)
//!
//! - **`InvalidArgs`**: Bad argument, wrong fingerprint width, or an
//!   operation invoked on a closed device.
//! - **`Unsupported`**: The backend does not implement the operation, or the
//!   requested field was never populated by the parsed data.
//!
//! ## Flow Control
//!
//! - **`Cancelled`**: The cancellation flag was observed at a transport
//!   boundary. The operation unwound cleanly; partial results stand.
//! - **`Done`**: Internal end-of-stream marker used between protocol layers.
//!   It never escapes the public API.

use thiserror::Error;

/// Errors that can occur while downloading or decoding dive data.
///
/// See the module-level documentation for recovery strategies.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation or field not implemented for this backend.
    #[error("not supported: {0}")]
    Unsupported(&'static str),

    #[error("invalid arguments: {0}")]
    InvalidArgs(&'static str),

    /// A buffer limit was exceeded.
    #[error("out of memory")]
    NoMemory,

    #[error("no device: {0}")]
    NoDevice(String),

    #[error("access denied: {0}")]
    NoAccess(String),

    /// Transport failure or malformed incoming bytes.
    #[error("I/O error: {0}")]
    Io(String),

    #[error("timeout")]
    Timeout,

    /// Checksum mismatch, unexpected opcode, or framing violation.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("cancelled")]
    Cancelled,

    /// Transport-level negative acknowledgement.
    #[error("negative acknowledgement")]
    Nack,

    #[error("data format error: {0}")]
    DataFormat(String),

    /// End-of-stream sentinel for internal signaling.
    #[error("end of stream")]
    Done,

    #[error("config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::Timeout,
            std::io::ErrorKind::NotFound => Error::NoDevice(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Error::NoAccess(err.to_string()),
            _ => Error::Io(err.to_string()),
        }
    }
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => Error::NoDevice(err.to_string()),
            _ => Error::Io(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_from_io_error() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::TimedOut).into();
        assert!(matches!(err, Error::Timeout));
    }

    #[test]
    fn test_io_error_message() {
        let err = Error::Protocol("bad checksum".into());
        assert_eq!(err.to_string(), "protocol violation: bad checksum");
    }
}
