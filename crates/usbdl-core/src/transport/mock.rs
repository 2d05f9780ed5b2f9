//! Mock USB transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{TransportError, UsbTransport};
use crate::protocol::{
    BOOTLOADER_PRODUCT_ID, Channel, ControlCommand, ControlMessageHeader, RIM_VENDOR_ID,
};

/// Queued outcome of a read.
enum MockRead {
    Data(Vec<u8>),
    Timeout,
    Stall,
}

/// One captured write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockWrite {
    pub data: Vec<u8>,
    pub timeout: Duration,
}

/// Mock transport for unit testing protocol logic.
///
/// Clones share the same queues, so a test can keep a handle after moving
/// the transport into a session.
#[derive(Clone)]
pub struct MockTransport {
    /// Queued responses to return on read.
    read_queue: Arc<Mutex<VecDeque<MockRead>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<MockWrite>>>,
    /// Number of upcoming writes that should time out.
    failing_writes: Arc<Mutex<usize>>,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            read_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            failing_writes: Arc::new(Mutex::new(0)),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue raw bytes to be returned on next read.
    pub fn queue_raw(&self, bytes: &[u8]) {
        self.read_queue
            .lock()
            .unwrap()
            .push_back(MockRead::Data(bytes.to_vec()));
    }

    /// Queue a control-channel frame with a correct packet size.
    pub fn queue_frame(&self, command: ControlCommand, payload: &[u8]) {
        let header = ControlMessageHeader::new(
            Channel::Control,
            command.code(),
            0x01,
            0,
            payload.len() as u16,
        );
        let mut frame = header.to_bytes().to_vec();
        frame.extend_from_slice(payload);
        self.queue_raw(&frame);
    }

    /// Queue a read that times out.
    pub fn queue_timeout(&self) {
        self.read_queue.lock().unwrap().push_back(MockRead::Timeout);
    }

    /// Queue a read that stalls the IN endpoint.
    pub fn queue_stall(&self) {
        self.read_queue.lock().unwrap().push_back(MockRead::Stall);
    }

    /// Make the next `count` writes time out.
    pub fn fail_writes(&self, count: usize) {
        *self.failing_writes.lock().unwrap() = count;
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<MockWrite> {
        self.write_log.lock().unwrap().clone()
    }

    /// Number of reads still queued.
    pub fn pending_reads(&self) -> usize {
        self.read_queue.lock().unwrap().len()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn write(&self, data: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        {
            let mut failing = self.failing_writes.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
        self.write_log.lock().unwrap().push(MockWrite {
            data: data.to_vec(),
            timeout,
        });
        Ok(data.len())
    }

    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        let timed_out = TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        };
        match self.read_queue.lock().unwrap().pop_front() {
            Some(MockRead::Data(mut bytes)) => {
                bytes.truncate(max_len);
                Ok(bytes)
            }
            Some(MockRead::Stall) => Err(TransportError::Stall { endpoint: 0x82 }),
            Some(MockRead::Timeout) | None => Err(timed_out),
        }
    }

    fn vendor_id(&self) -> u16 {
        RIM_VENDOR_ID
    }

    fn product_id(&self) -> u16 {
        BOOTLOADER_PRODUCT_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(5000);

    #[test]
    fn test_mock_read_queue() {
        let mock = MockTransport::new();
        mock.queue_frame(ControlCommand::PingResponse, &[]);
        mock.queue_raw(b"\x01\x02");

        let first = mock.read(2048, T).unwrap();
        assert_eq!(first.len(), 8);
        assert_eq!(first[4], ControlCommand::PingResponse.code());

        let second = mock.read(2048, T).unwrap();
        assert_eq!(second, vec![0x01, 0x02]);

        // Queue is empty now
        assert!(matches!(
            mock.read(2048, T),
            Err(TransportError::Timeout { timeout_ms: 5000 })
        ));
    }

    #[test]
    fn test_mock_write_capture() {
        let mock = MockTransport::new();
        mock.write(b"Hello", T).unwrap();
        mock.write(b"World", Duration::from_millis(1000)).unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].data, b"Hello");
        assert_eq!(writes[1].timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_mock_failing_write_not_logged() {
        let mock = MockTransport::new();
        mock.fail_writes(1);
        assert!(mock.write(b"lost", T).is_err());
        assert!(mock.write(b"kept", T).is_ok());
        assert_eq!(mock.get_writes().len(), 1);
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        mock.queue_frame(ControlCommand::PingResponse, &[]);
        mock.disconnect();
        assert!(matches!(
            mock.write(b"test", T),
            Err(TransportError::Disconnected)
        ));
        assert!(matches!(
            mock.read(2048, T),
            Err(TransportError::Disconnected)
        ));
        assert!(mock.get_writes().is_empty());
    }
}
