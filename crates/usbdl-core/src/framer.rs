//! Transport framer: header packing, bulk exchange, packet sequencing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use crate::events::{PacketDirection, TracingObserver, UsbdlEvent, UsbdlObserver};
use crate::protocol::{
    Channel, ControlCommand, ControlMessageHeader, DEFAULT_TIMEOUT, MAX_FRAME_SIZE, ProtocolError,
};
use crate::transport::UsbTransport;

/// A received frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: ControlMessageHeader,
    pub payload: Vec<u8>,
    /// First byte of the transfer, as seen on the wire.
    pub first_byte: u8,
}

impl Frame {
    /// Decode one IN transfer.
    ///
    /// The payload is everything after the header; a `packet_size` that
    /// disagrees with the transfer length is only logged.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (header, header_len) = ControlMessageHeader::from_wire(bytes)?;
        if header.packet_size as usize != bytes.len() + (ControlMessageHeader::SIZE - header_len) {
            warn!(
                declared = header.packet_size,
                received = bytes.len(),
                "Packet size disagrees with transfer length"
            );
        }
        Ok(Self {
            header,
            payload: bytes[header_len..].to_vec(),
            first_byte: bytes[0],
        })
    }

    pub fn command(&self) -> Option<ControlCommand> {
        self.header.command()
    }

    /// Declared payload is empty (`packet_size == 8`).
    pub fn is_empty(&self) -> bool {
        self.header.packet_size as usize == ControlMessageHeader::SIZE
    }
}

/// Packs frames onto the bulk endpoints and reads replies.
///
/// Owns the transport and the packet sequence counter. Every call to
/// [`Framer::send`] consumes one packet id, whether or not the transfer
/// succeeds. No call is ever retried here.
pub struct Framer<T: UsbTransport> {
    transport: T,
    next_packet_id: u16,
    timeout: Duration,
    observer: Arc<dyn UsbdlObserver>,
}

impl<T: UsbTransport> Framer<T> {
    pub fn new(transport: T) -> Self {
        Self::with_observer(transport, Arc::new(TracingObserver))
    }

    pub fn with_observer(transport: T, observer: Arc<dyn UsbdlObserver>) -> Self {
        Self {
            transport,
            next_packet_id: 0,
            timeout: DEFAULT_TIMEOUT,
            observer,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Packet id the next send will carry.
    pub fn next_packet_id(&self) -> u16 {
        self.next_packet_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub(crate) fn emit(&self, event: UsbdlEvent) {
        self.observer.on_event(&event);
    }

    /// Send one frame. Returns the number of bytes written.
    #[instrument(level = "debug", skip(self, payload), fields(len = payload.len()))]
    pub fn send(
        &mut self,
        channel: Channel,
        command: ControlCommand,
        mode: u8,
        payload: &[u8],
    ) -> Result<usize, ProtocolError> {
        let payload_len = u16::try_from(payload.len())
            .ok()
            .filter(|len| len.checked_add(ControlMessageHeader::SIZE as u16).is_some())
            .ok_or(ProtocolError::PayloadTooLarge { len: payload.len() })?;

        let packet_id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1);

        let header =
            ControlMessageHeader::new(channel, command.code(), mode, packet_id, payload_len);
        let mut frame = header.wire_bytes(channel);
        frame.extend_from_slice(payload);

        let written = self.transport.write(&frame, self.timeout)?;
        self.emit(UsbdlEvent::Packet {
            direction: PacketDirection::Tx,
            channel: Some(channel),
            data: frame,
        });
        Ok(written)
    }

    /// Write bytes with no framing and no packet id.
    pub fn send_raw(&mut self, data: &[u8], timeout: Duration) -> Result<usize, ProtocolError> {
        let written = self.transport.write(data, timeout)?;
        self.emit(UsbdlEvent::Packet {
            direction: PacketDirection::Tx,
            channel: None,
            data: data.to_vec(),
        });
        Ok(written)
    }

    /// Receive one frame of at most `max_len` bytes.
    #[instrument(level = "debug", skip(self))]
    pub fn receive_with_limit(&mut self, max_len: usize) -> Result<Frame, ProtocolError> {
        let bytes = self.transport.read(max_len, self.timeout)?;
        let channel = ControlMessageHeader::from_wire(&bytes)
            .ok()
            .map(|(h, _)| h.channel());
        self.emit(UsbdlEvent::Packet {
            direction: PacketDirection::Rx,
            channel,
            data: bytes.clone(),
        });
        Frame::parse(&bytes)
    }

    /// Receive one frame.
    pub fn receive(&mut self) -> Result<Frame, ProtocolError> {
        self.receive_with_limit(MAX_FRAME_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::protocol::{HeaderError, MODE_UNSET};
    use crate::transport::{MockTransport, TransportError};

    fn framer() -> (Framer<MockTransport>, MockTransport) {
        let mock = MockTransport::new();
        (
            Framer::with_observer(mock.clone(), Arc::new(NullObserver)),
            mock,
        )
    }

    #[test]
    fn test_packet_size_tracks_payload() {
        let (mut framer, mock) = framer();
        for len in [0usize, 1, 4, 17, 68, 300] {
            let payload = vec![0xAA; len];
            framer
                .send(Channel::Control, ControlCommand::Ping, MODE_UNSET, &payload)
                .unwrap();
        }
        for (write, len) in mock.get_writes().iter().zip([0usize, 1, 4, 17, 68, 300]) {
            let header = ControlMessageHeader::from_bytes(&write.data).unwrap();
            assert_eq!(header.packet_size as usize, len + 8);
            assert_eq!(write.data.len(), len + 8);
        }
    }

    #[test]
    fn test_counter_advances_on_failed_send() {
        let (mut framer, mock) = framer();
        framer
            .send(Channel::Control, ControlCommand::Ping, 1, &[])
            .unwrap();
        mock.fail_writes(1);
        assert!(matches!(
            framer.send(Channel::Control, ControlCommand::Ping, 1, &[]),
            Err(ProtocolError::Transport(TransportError::Timeout { .. }))
        ));
        framer
            .send(Channel::Control, ControlCommand::Ping, 1, &[])
            .unwrap();
        assert_eq!(framer.next_packet_id(), 3);

        let ids: Vec<u16> = mock
            .get_writes()
            .iter()
            .map(|w| ControlMessageHeader::from_bytes(&w.data).unwrap().packet_id)
            .collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_counter_wraps() {
        let (mut framer, mock) = framer();
        framer.next_packet_id = u16::MAX;
        framer
            .send(Channel::Control, ControlCommand::Ping, 1, &[])
            .unwrap();
        framer
            .send(Channel::Control, ControlCommand::Ping, 1, &[])
            .unwrap();
        let writes = mock.get_writes();
        assert_eq!(
            ControlMessageHeader::from_bytes(&writes[0].data)
                .unwrap()
                .packet_id,
            u16::MAX
        );
        assert_eq!(
            ControlMessageHeader::from_bytes(&writes[1].data)
                .unwrap()
                .packet_id,
            0
        );
    }

    #[test]
    fn test_oversized_payload_rejected_without_consuming_id() {
        let (mut framer, mock) = framer();
        let payload = vec![0u8; u16::MAX as usize];
        assert!(matches!(
            framer.send(Channel::Control, ControlCommand::Ping, 1, &payload),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
        assert_eq!(framer.next_packet_id(), 0);
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_loader_frame_has_short_header() {
        let (mut framer, mock) = framer();
        framer
            .send(
                Channel::Loader,
                ControlCommand::LoadTransferredData,
                1,
                &[1, 2, 3, 4],
            )
            .unwrap();
        let data = &mock.get_writes()[0].data;
        assert_eq!(data.len(), 6 + 4);
        assert_eq!(&data[..6], &[0x00, 0x10, 0x0C, 0x00, 0x0B, 0x01]);
        assert_eq!(&data[6..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_receive_splits_header_and_payload() {
        let (mut framer, mock) = framer();
        mock.queue_frame(ControlCommand::GetVariableResponse, &[9, 8, 7]);
        let frame = framer.receive().unwrap();
        assert_eq!(frame.command(), Some(ControlCommand::GetVariableResponse));
        assert_eq!(frame.payload, vec![9, 8, 7]);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_receive_trusts_transfer_length_over_packet_size() {
        let (mut framer, mock) = framer();
        // Declares 100 payload bytes, carries 5.
        let header = ControlMessageHeader::new(
            Channel::Control,
            ControlCommand::GetVariableResponse.code(),
            1,
            0,
            100,
        );
        let mut short = header.to_bytes().to_vec();
        short.extend_from_slice(&[1, 2, 3, 4, 5]);
        mock.queue_raw(&short);

        // Declares an empty payload, carries 3.
        let header = ControlMessageHeader::new(
            Channel::Control,
            ControlCommand::GetVariableResponse.code(),
            1,
            0,
            0,
        );
        let mut long = header.to_bytes().to_vec();
        long.extend_from_slice(&[7, 8, 9]);
        mock.queue_raw(&long);

        let frame = framer.receive().unwrap();
        assert_eq!(frame.header.packet_size, 108);
        assert_eq!(frame.payload, vec![1, 2, 3, 4, 5]);

        let frame = framer.receive().unwrap();
        assert_eq!(frame.payload, vec![7, 8, 9]);
    }

    #[test]
    fn test_receive_truncated_header() {
        let (mut framer, mock) = framer();
        mock.queue_raw(&[0x00, 0x00, 0x08]);
        assert!(matches!(
            framer.receive(),
            Err(ProtocolError::Header(HeaderError::BufferTooSmall { .. }))
        ));
    }

    #[test]
    fn test_receive_surfaces_transport_error() {
        let (mut framer, mock) = framer();
        mock.queue_stall();
        assert!(matches!(
            framer.receive(),
            Err(ProtocolError::Transport(TransportError::Stall { endpoint: 0x82 }))
        ));
    }
}
