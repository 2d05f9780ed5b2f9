//! Protocol module - bootloader wire definitions.

pub mod command;
pub mod constants;
pub mod error;
pub mod header;
pub mod mode;

pub use command::ControlCommand;
pub use constants::*;
pub use error::ProtocolError;
pub use header::{Channel, ControlMessageHeader, HeaderError};
pub use mode::{BootloaderMode, MODE_ID_LEN};
