//! Event system for diagnostics.
//!
//! Every frame the framer sends or receives, plus mode changes and
//! authentication outcomes, is reported to a `UsbdlObserver`. Observers only
//! watch; nothing they do feeds back into the protocol.

use std::fmt;
use std::fmt::Write as _;

use crate::auth::AuthOutcome;
use crate::loader::LoaderStatus;
use crate::protocol::{BootloaderMode, Channel};
use crate::session::Verdict;

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Events emitted by a session.
#[derive(Debug, Clone)]
pub enum UsbdlEvent {
    /// Device opened and interface claimed.
    DeviceConnected { vid: u16, pid: u16 },
    /// Session adopted a new bootloader mode.
    ModeChanged {
        from: Option<BootloaderMode>,
        to: BootloaderMode,
        verdict: Verdict,
    },
    /// Frame sent or received. `channel` is `None` for raw writes.
    Packet {
        direction: PacketDirection,
        channel: Option<Channel>,
        data: Vec<u8>,
    },
    /// Password exchange finished.
    Authentication { outcome: AuthOutcome },
    /// Loader handshake finished.
    Loader { status: LoaderStatus },
}

/// Observer trait for receiving session events.
pub trait UsbdlObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &UsbdlEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl UsbdlObserver for NullObserver {
    fn on_event(&self, _event: &UsbdlEvent) {}
}

/// Observer that logs events using tracing.
///
/// Packets are rendered as a hex dump at TRACE level.
pub struct TracingObserver;

impl UsbdlObserver for TracingObserver {
    fn on_event(&self, event: &UsbdlEvent) {
        match event {
            UsbdlEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Device connected");
            }
            UsbdlEvent::ModeChanged { from, to, verdict } => {
                let from = from.map_or_else(|| "unset".to_string(), |m| m.to_string());
                tracing::info!(from = %from, to = %to, verdict = %verdict, "Bootloader mode changed");
            }
            UsbdlEvent::Packet {
                direction,
                channel,
                data,
            } => {
                if tracing::enabled!(tracing::Level::TRACE) {
                    let channel = channel.map_or_else(|| "raw".to_string(), |c| c.to_string());
                    tracing::trace!(
                        dir = %direction,
                        channel = %channel,
                        len = data.len(),
                        "USB Packet\n{}",
                        hex_dump(data)
                    );
                }
            }
            UsbdlEvent::Authentication { outcome } => {
                tracing::info!(outcome = %outcome, "Authentication finished");
            }
            UsbdlEvent::Loader { status } => {
                tracing::info!(status = ?status, "Loader handshake finished");
            }
        }
    }
}

/// Render bytes as lowercase hex, 16 per row.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3 + data.len() / 16 + 1);
    for (row_idx, row) in data.chunks(16).enumerate() {
        if row_idx > 0 {
            out.push('\n');
        }
        for (i, b) in row.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{:02x}", b);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_hex_dump_rows() {
        let data: Vec<u8> = (0u8..20).collect();
        let dump = hex_dump(&data);
        let rows: Vec<&str> = dump.lines().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].split(' ').count(), 16);
        assert_eq!(rows[1], "10 11 12 13");
    }

    #[test]
    fn test_hex_dump_empty() {
        assert_eq!(hex_dump(&[]), "");
    }

    struct Recorder(Mutex<Vec<String>>);

    impl UsbdlObserver for Recorder {
        fn on_event(&self, event: &UsbdlEvent) {
            self.0.lock().unwrap().push(format!("{event:?}"));
        }
    }

    #[test]
    fn test_custom_observer_receives_events() {
        let rec = Recorder(Mutex::new(Vec::new()));
        rec.on_event(&UsbdlEvent::Authentication {
            outcome: AuthOutcome::NotRequired,
        });
        NullObserver.on_event(&UsbdlEvent::DeviceConnected { vid: 1, pid: 2 });
        assert_eq!(rec.0.lock().unwrap().len(), 1);
    }
}
