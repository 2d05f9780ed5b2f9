//! Control message command codes.

use num_enum::TryFromPrimitive;
use std::fmt;

/// Command byte carried in every frame header.
///
/// Directions are from the host's point of view. The two reserved codes are
/// kept so that every byte the firmware is known to emit has a name.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
pub enum ControlCommand {
    Ping = 0x01, // OUT
    PingResponse = 0x02, // IN
    Reboot = 0x03, // OUT
    RebootResponse = 0x04, // IN
    GetVariable = 0x05, // OUT
    GetVariableResponse = 0x06, // IN
    SetMode = 0x07, // OUT
    SetModeSuccess = 0x08, // IN
    SetModeFailure = 0x09, // IN
    GetPasswordInfo = 0x0A, // OUT
    LoadTransferredData = 0x0B, // IN/OUT
    LoadTransferredDataSuccess = 0x0C, // IN/OUT
    LoadTransferredDataFailure = 0x0D, // IN/OUT
    GetPasswordInfoResponse = 0x0E, // IN
    SendPassword = 0x0F, // OUT
    SendPasswordCorrect = 0x10, // IN
    Reserved11 = 0x11,
    Reserved12 = 0x12,
    ReadyForDataTransfer = 0x13, // IN
}

impl ControlCommand {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a raw command byte, `None` for codes outside the known range.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::try_from(code).ok()
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_contiguous() {
        for code in 0x01..=0x13u8 {
            let cmd = ControlCommand::from_code(code).unwrap();
            assert_eq!(cmd.code(), code);
        }
        assert_eq!(ControlCommand::from_code(0x00), None);
        assert_eq!(ControlCommand::from_code(0x14), None);
    }

    #[test]
    fn test_password_correct_code() {
        assert_eq!(ControlCommand::SendPasswordCorrect.code(), 0x10);
        assert_eq!(ControlCommand::ReadyForDataTransfer.code(), 0x13);
    }
}
