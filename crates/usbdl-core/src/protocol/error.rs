//! Protocol-level errors.

use thiserror::Error;

use super::header::HeaderError;
use crate::transport::TransportError;

/// A failed exchange.
///
/// Rejections the device is allowed to make (wrong password, SetMode
/// failure, loader not ready) are not errors; they come back as values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Malformed header: {0}")]
    Header(#[from] HeaderError),

    #[error("Truncated {what}: expected at least {expected} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Payload of {len} bytes does not fit a 16-bit packet size")]
    PayloadTooLarge { len: usize },
}
