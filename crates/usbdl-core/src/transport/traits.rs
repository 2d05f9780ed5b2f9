//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for blocking bulk transfers,
//! allowing different implementations (nusb, mock, etc.).

use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Endpoint 0x{endpoint:02X} stalled")]
    Stall { endpoint: u8 },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Classify an I/O error from a bulk transfer on `endpoint`.
    ///
    /// Errors without a dedicated variant are kept verbatim.
    pub fn from_io(err: io::Error, endpoint: u8, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            },
            io::ErrorKind::BrokenPipe => TransportError::Stall { endpoint },
            io::ErrorKind::NotConnected | io::ErrorKind::ConnectionReset => {
                TransportError::Disconnected
            }
            _ => TransportError::Io(err),
        }
    }
}

/// Abstract USB transport interface.
///
/// Every call blocks until the transfer completes or `timeout` expires.
/// Implementations never retry.
pub trait UsbTransport: Send + Sync {
    /// Write raw bytes to the OUT endpoint.
    fn write(&self, data: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Read one transfer of at most `max_len` bytes from the IN endpoint.
    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let err = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        let mapped = TransportError::from_io(err, 0x82, Duration::from_millis(5000));
        assert!(matches!(mapped, TransportError::Timeout { timeout_ms: 5000 }));
    }

    #[test]
    fn test_stall_and_passthrough() {
        let err = io::Error::new(io::ErrorKind::BrokenPipe, "stall");
        let mapped = TransportError::from_io(err, 0x02, Duration::from_millis(1000));
        assert!(matches!(mapped, TransportError::Stall { endpoint: 0x02 }));

        let err = io::Error::from_raw_os_error(71);
        let mapped = TransportError::from_io(err, 0x82, Duration::from_millis(1000));
        match mapped {
            TransportError::Io(e) => assert_eq!(e.raw_os_error(), Some(71)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
