//! Frame headers for the control and loader channels.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use thiserror::Error;

use super::command::ControlCommand;
use super::constants::{
    CONTROL_HEADER_SIZE, CONTROL_MESSAGE_TYPE, LOADER_HEADER_SIZE, LOADER_MESSAGE_TYPE,
};

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
}

/// Which channel a frame travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Command/response exchange, full 8-byte header.
    Control,
    /// Loader exchange, 6-byte header without the packet id.
    Loader,
}

impl Channel {
    pub fn message_type(self) -> u16 {
        match self {
            Channel::Control => CONTROL_MESSAGE_TYPE,
            Channel::Loader => LOADER_MESSAGE_TYPE,
        }
    }

    /// Header bytes actually put on the wire.
    pub fn header_len(self) -> usize {
        match self {
            Channel::Control => CONTROL_HEADER_SIZE,
            Channel::Loader => LOADER_HEADER_SIZE,
        }
    }

    pub fn from_message_type(kind: u16) -> Self {
        if kind == LOADER_MESSAGE_TYPE {
            Channel::Loader
        } else {
            Channel::Control
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Control => write!(f, "control"),
            Channel::Loader => write!(f, "loader"),
        }
    }
}

/// Control Message Header (8 bytes, packed, little-endian)
///
/// | offset | field       |
/// |--------|-------------|
/// | 0      | type        |
/// | 2      | packet size |
/// | 4      | command     |
/// | 5      | mode        |
/// | 6      | packet id   |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlMessageHeader {
    pub kind: u16,
    /// Payload length plus the full 8-byte header.
    pub packet_size: u16,
    pub command: u8,
    pub mode: u8,
    pub packet_id: u16,
}

impl ControlMessageHeader {
    pub const SIZE: usize = CONTROL_HEADER_SIZE;

    pub fn new(channel: Channel, command: u8, mode: u8, packet_id: u16, payload_len: u16) -> Self {
        Self {
            kind: channel.message_type(),
            packet_size: payload_len + Self::SIZE as u16,
            command,
            mode,
            packet_id,
        }
    }

    pub fn channel(&self) -> Channel {
        Channel::from_message_type(self.kind)
    }

    /// Known command, if the byte is one.
    pub fn command(&self) -> Option<ControlCommand> {
        ControlCommand::from_code(self.command)
    }

    /// Payload length declared by the header.
    pub fn payload_len(&self) -> usize {
        (self.packet_size as usize).saturating_sub(Self::SIZE)
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        LittleEndian::write_u16(&mut buf[0..2], self.kind);
        LittleEndian::write_u16(&mut buf[2..4], self.packet_size);
        buf[4] = self.command;
        buf[5] = self.mode;
        LittleEndian::write_u16(&mut buf[6..8], self.packet_id);
        buf
    }

    /// Bytes as sent on `channel`; loader frames drop the packet id.
    pub fn wire_bytes(&self, channel: Channel) -> Vec<u8> {
        self.to_bytes()[..channel.header_len()].to_vec()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            kind: LittleEndian::read_u16(&data[0..2]),
            packet_size: LittleEndian::read_u16(&data[2..4]),
            command: data[4],
            mode: data[5],
            packet_id: LittleEndian::read_u16(&data[6..8]),
        })
    }

    /// Decode a received header, accepting the short loader layout.
    ///
    /// Returns the header and the number of bytes it occupied.
    pub fn from_wire(data: &[u8]) -> Result<(Self, usize), HeaderError> {
        if data.len() < LOADER_HEADER_SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: LOADER_HEADER_SIZE,
                actual: data.len(),
            });
        }
        let kind = LittleEndian::read_u16(&data[0..2]);
        match Channel::from_message_type(kind) {
            Channel::Control => Ok((Self::from_bytes(data)?, Self::SIZE)),
            Channel::Loader => Ok((
                Self {
                    kind,
                    packet_size: LittleEndian::read_u16(&data[2..4]),
                    command: data[4],
                    mode: data[5],
                    packet_id: 0,
                },
                LOADER_HEADER_SIZE,
            )),
        }
    }
}
