//! Protocol constants for the BlackBerry (RIM) USB bootloader.

use std::time::Duration;

// ============================================================================
// Device Identification
// ============================================================================

/// Research In Motion Vendor ID
pub const RIM_VENDOR_ID: u16 = 0x0FCA;

/// Bootloader Product ID
pub const BOOTLOADER_PRODUCT_ID: u16 = 0x0001;

/// Interface claimed for the whole session.
pub const BOOTLOADER_INTERFACE: u8 = 0;

// ============================================================================
// Endpoints and Timeouts
// ============================================================================

/// Bulk OUT endpoint (host -> device).
pub const BULK_OUT_ENDPOINT: u8 = 0x02;

/// Bulk IN endpoint (device -> host).
pub const BULK_IN_ENDPOINT: u8 = 0x82;

/// Default bulk transfer timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Timeout for the loader start-transfer write.
pub const LOADER_START_TIMEOUT_MS: u64 = 1000;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(DEFAULT_TIMEOUT_MS);
pub const LOADER_START_TIMEOUT: Duration = Duration::from_millis(LOADER_START_TIMEOUT_MS);

// ============================================================================
// Framing
// ============================================================================

/// Control-channel header size on the wire.
pub const CONTROL_HEADER_SIZE: usize = 8;

/// Loader-channel header size on the wire (packet id omitted).
pub const LOADER_HEADER_SIZE: usize = 6;

/// Message type for control-channel frames.
pub const CONTROL_MESSAGE_TYPE: u16 = 0x0000;

/// Message type for loader-channel frames.
pub const LOADER_MESSAGE_TYPE: u16 = 0x1000;

/// Largest frame read from the IN endpoint in one transfer.
pub const MAX_FRAME_SIZE: usize = 2048;

/// Mode byte stamped on frames before the first SetMode.
pub const MODE_UNSET: u8 = 0xFF;

// ============================================================================
// Variables
// ============================================================================

/// Variable holding the device identity / build record.
pub const VAR_DEVICE_INFO: u16 = 2;

/// Buffer size requested for the device identity record.
pub const DEVICE_INFO_BUFFER_SIZE: u16 = 2048;

// ============================================================================
// Password Challenge
// ============================================================================

/// Offset of the challenge token in a GetPasswordInfo payload.
pub const CHALLENGE_OFFSET: usize = 4;
/// Offset of the salt in a GetPasswordInfo payload.
pub const SALT_OFFSET: usize = 12;
/// Offset of the iteration count in a GetPasswordInfo payload.
pub const ITERATIONS_OFFSET: usize = 20;
/// Minimum GetPasswordInfo payload carrying a full challenge.
pub const PASSWORD_INFO_MIN_LEN: usize = ITERATIONS_OFFSET + 4;

pub const CHALLENGE_LEN: usize = 4;
pub const SALT_LEN: usize = 8;

/// Password buffer / SendPassword payload length.
pub const PASSWORD_RESPONSE_LEN: usize = 68;

/// Tag overwriting the first 4 bytes of the SendPassword payload.
pub const PASSWORD_RESPONSE_TAG: [u8; 4] = [0x00, 0x00, 0x40, 0x00];

/// First reply byte signalling an accepted password.
pub const PASSWORD_ACCEPTED_BYTE: u8 = 0x10;

// ============================================================================
// Loader
// ============================================================================

/// Control payload telling the device to start accepting a loader stream.
pub const LOADER_START_TRANSFER: [u8; 16] = [
    0x01, 0x00, 0x10, 0x00, 0x7b, 0x09, 0x2b, 0x96, 0x0c, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xf0,
];
