//! Bootloader modes and their SetMode identifiers.

use num_enum::TryFromPrimitive;
use std::fmt;

/// Length of a SetMode identifier payload.
pub const MODE_ID_LEN: usize = 17;

/// Named bootloader operating state.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
pub enum BootloaderMode {
    RimReinit = 0,
    RimBoot = 1,
    RamBoot = 2,
    Upl = 3,
    RimBootNuke = 4,
}

impl BootloaderMode {
    /// Value echoed into the mode byte of every outbound header.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Fixed 17-byte SetMode payload: NUL padded, `0x01` at offset 16.
    pub fn identifier(self) -> [u8; MODE_ID_LEN] {
        let name: &[u8] = match self {
            BootloaderMode::RimReinit => b"RIM REINIT",
            BootloaderMode::RimBoot => b"RIM-BootLoader",
            BootloaderMode::RamBoot => b"RIM-RAMLoader",
            BootloaderMode::Upl => b"RIM UPL",
            // Nuke shares the boot loader name; the mode byte tells them apart.
            BootloaderMode::RimBootNuke => b"RIM-BootLoader",
        };
        let mut id = [0u8; MODE_ID_LEN];
        id[..name.len()].copy_from_slice(name);
        id[MODE_ID_LEN - 1] = 0x01;
        id
    }
}

impl fmt::Display for BootloaderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootloaderMode::RimReinit => write!(f, "RIM REINIT"),
            BootloaderMode::RimBoot => write!(f, "RIM BOOT"),
            BootloaderMode::RamBoot => write!(f, "RAM BOOT"),
            BootloaderMode::Upl => write!(f, "UPL"),
            BootloaderMode::RimBootNuke => write!(f, "RIM BOOT NUKE"),
        }
    }
}
