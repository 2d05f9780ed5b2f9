//! Loader handshake - gets the device ready to accept a loader stream.

use tracing::{debug, info, instrument};

use crate::events::UsbdlEvent;
use crate::protocol::{ControlCommand, LOADER_START_TRANSFER, ProtocolError};
use crate::session::Session;
use crate::transport::UsbTransport;

/// Outcome of [`begin_transfer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderStatus {
    /// Start-transfer control payload sent.
    Ready,
    /// Device was not ready; nothing was sent.
    Aborted,
}

/// Wait for ReadyForDataTransfer and send the start-transfer payload.
///
/// The reply to the start-transfer payload is read and dropped.
#[instrument(skip(session))]
pub fn begin_transfer<T: UsbTransport>(
    session: &mut Session<T>,
) -> Result<LoaderStatus, ProtocolError> {
    let loader_timeout = session.config().loader_timeout();
    let framer = session.framer_mut();

    let frame = framer.receive()?;
    let status = if frame.header.command != ControlCommand::ReadyForDataTransfer.code() {
        debug!(command = frame.header.command, "Device not ready for data transfer");
        LoaderStatus::Aborted
    } else {
        info!("Device ready for data transfer, starting");
        framer.send_raw(&LOADER_START_TRANSFER, loader_timeout)?;
        let reply = framer.receive()?;
        debug!(len = reply.payload.len(), "Start-transfer reply dropped");
        LoaderStatus::Ready
    };

    framer.emit(UsbdlEvent::Loader { status });
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::protocol::LOADER_START_TIMEOUT;
    use crate::session::SessionConfig;
    use crate::transport::MockTransport;
    use std::sync::Arc;

    fn session() -> (Session<MockTransport>, MockTransport) {
        let mock = MockTransport::new();
        (
            Session::with_observer(mock.clone(), SessionConfig::default(), Arc::new(NullObserver)),
            mock,
        )
    }

    #[test]
    fn test_not_ready_sends_nothing() {
        let (mut s, mock) = session();
        mock.queue_frame(ControlCommand::PingResponse, &[]);
        assert_eq!(begin_transfer(&mut s).unwrap(), LoaderStatus::Aborted);
        assert!(mock.get_writes().is_empty());
        assert_eq!(s.next_packet_id(), 0);
    }

    #[test]
    fn test_ready_sends_start_payload_with_short_timeout() {
        let (mut s, mock) = session();
        mock.queue_frame(ControlCommand::ReadyForDataTransfer, &[]);
        mock.queue_frame(ControlCommand::LoadTransferredData, &[0xAB; 32]);

        assert_eq!(begin_transfer(&mut s).unwrap(), LoaderStatus::Ready);

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].data, LOADER_START_TRANSFER.to_vec());
        assert_eq!(writes[0].timeout, LOADER_START_TIMEOUT);
        assert_eq!(mock.pending_reads(), 0);
        // Raw writes do not consume packet ids
        assert_eq!(s.next_packet_id(), 0);
    }

    #[test]
    fn test_ready_frame_on_loader_channel() {
        let (mut s, mock) = session();
        mock.queue_raw(&[0x00, 0x10, 0x08, 0x00, 0x13, 0x01]);
        mock.queue_frame(ControlCommand::LoadTransferredDataSuccess, &[]);
        assert_eq!(begin_transfer(&mut s).unwrap(), LoaderStatus::Ready);
    }

    #[test]
    fn test_missing_reply_is_an_error() {
        let (mut s, mock) = session();
        mock.queue_frame(ControlCommand::ReadyForDataTransfer, &[]);
        assert!(matches!(
            begin_transfer(&mut s),
            Err(ProtocolError::Transport(_))
        ));
        assert_eq!(mock.get_writes().len(), 1);
    }
}
