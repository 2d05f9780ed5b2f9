//! usbdl-core: BlackBerry USB bootloader protocol in Rust.
//!
//! Unlocks, queries and prepares a RIM bootloader for a loader payload over
//! USB bulk endpoints.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, command codes, modes, frame headers
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **Framer**: Header packing, packet sequencing, bulk exchange
//! - **Session**: Mode tracking and the command vocabulary
//! - **Auth**: SHA-512 password challenge-response
//! - **Loader**: Start-of-transfer handshake
//! - **Device Info**: Versioned layout of the identity record
//! - **Events**: Observer side channel (packet hex dumps, outcomes)
//!
//! # Example
//!
//! ```no_run
//! use usbdl_core::protocol::{BOOTLOADER_PRODUCT_ID, BootloaderMode, RIM_VENDOR_ID};
//! use usbdl_core::{NusbTransport, Session, SessionConfig};
//!
//! let transport = NusbTransport::open_with_ids(RIM_VENDOR_ID, BOOTLOADER_PRODUCT_ID)
//!     .expect("no device");
//! let mut session = Session::new(transport, SessionConfig::default());
//! session.set_mode(BootloaderMode::RimBoot).expect("set mode failed");
//! let outcome = session.authenticate("password123").expect("auth failed");
//! println!("{outcome}");
//! ```

pub mod auth;
pub mod device_info;
pub mod events;
pub mod framer;
pub mod loader;
pub mod logic;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use auth::{AuthOutcome, ChallengeMaterial, PasswordInfo, compute_response};
pub use device_info::{DeviceInfo, FieldDescriptor, FieldEncoding, INFO_LAYOUT_V1, RecordLayout};
pub use events::{NullObserver, TracingObserver, UsbdlEvent, UsbdlObserver};
pub use framer::{Frame, Framer};
pub use loader::{LoaderStatus, begin_transfer};
pub use logic::{Task, TaskReport, run_task};
pub use protocol::{BootloaderMode, ControlCommand, ControlMessageHeader, ProtocolError};
pub use session::{Session, SessionConfig, Verdict};
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
