//! Bootloader session - command vocabulary over the framer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::auth::{AuthOutcome, ChallengeMaterial, PasswordInfo, compute_response};
use crate::device_info::{DeviceInfo, INFO_LAYOUT_V1};
use crate::events::{TracingObserver, UsbdlEvent, UsbdlObserver};
use crate::framer::{Frame, Framer};
use crate::protocol::{
    BootloaderMode, Channel, ControlCommand, ControlMessageHeader, DEFAULT_TIMEOUT_MS,
    DEVICE_INFO_BUFFER_SIZE, LOADER_START_TIMEOUT_MS, MAX_FRAME_SIZE, MODE_UNSET,
    PASSWORD_ACCEPTED_BYTE, PASSWORD_RESPONSE_LEN, ProtocolError, VAR_DEVICE_INFO,
};
use crate::transport::UsbTransport;

/// Configuration for a bootloader session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Password used when the device asks for one.
    pub password: String,
    /// Default bulk transfer timeout in milliseconds.
    pub timeout_ms: u64,
    /// Timeout for the loader start-transfer write.
    pub loader_timeout_ms: u64,
    /// Only adopt a new mode when the device answers SetModeSuccess.
    ///
    /// Off by default: the device is trusted to switch whatever it answers.
    pub strict_mode_switch: bool,
    /// Where the `info` task writes its report.
    pub info_path: String,
    /// Device wait polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Give up waiting for the device after this many seconds (0 = never).
    pub wait_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            password: "password123".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            loader_timeout_ms: LOADER_START_TIMEOUT_MS,
            strict_mode_switch: false,
            info_path: "info.txt".to_string(),
            poll_interval_ms: 1000,
            wait_timeout_secs: 0,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn loader_timeout(&self) -> Duration {
        Duration::from_millis(self.loader_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        (self.wait_timeout_secs > 0).then(|| Duration::from_secs(self.wait_timeout_secs))
    }
}

/// How the device answered a request it may legitimately refuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected,
    /// Reply did not say either way.
    Unknown,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accepted => write!(f, "accepted"),
            Verdict::Rejected => write!(f, "rejected"),
            Verdict::Unknown => write!(f, "unknown"),
        }
    }
}

/// One connection to a device in bootloader mode.
///
/// Owns the transport, the packet counter and the current mode. Every
/// command is a blocking send followed by a blocking receive.
pub struct Session<T: UsbTransport> {
    framer: Framer<T>,
    mode: Option<BootloaderMode>,
    config: SessionConfig,
}

impl<T: UsbTransport> Session<T> {
    /// Create a new session with default tracing observer.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }

    /// Create a new session with a custom observer.
    pub fn with_observer(
        transport: T,
        config: SessionConfig,
        observer: Arc<dyn UsbdlObserver>,
    ) -> Self {
        let mut framer = Framer::with_observer(transport, observer);
        framer.set_timeout(config.timeout());
        framer.emit(UsbdlEvent::DeviceConnected {
            vid: framer.transport().vendor_id(),
            pid: framer.transport().product_id(),
        });
        Self {
            framer,
            mode: None,
            config,
        }
    }

    /// Mode adopted by the last SetMode, `None` before the first one.
    pub fn mode(&self) -> Option<BootloaderMode> {
        self.mode
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Packet id the next frame will carry.
    pub fn next_packet_id(&self) -> u16 {
        self.framer.next_packet_id()
    }

    pub(crate) fn framer_mut(&mut self) -> &mut Framer<T> {
        &mut self.framer
    }

    pub fn into_transport(self) -> T {
        self.framer.into_transport()
    }

    fn mode_byte(&self) -> u8 {
        self.mode.map_or(MODE_UNSET, BootloaderMode::code)
    }

    fn exchange(
        &mut self,
        command: ControlCommand,
        payload: &[u8],
        max_len: usize,
    ) -> Result<Frame, ProtocolError> {
        let mode = self.mode_byte();
        self.framer.send(Channel::Control, command, mode, payload)?;
        self.framer.receive_with_limit(max_len)
    }

    /// Check the device is listening.
    #[instrument(skip(self))]
    pub fn ping(&mut self) -> Result<Verdict, ProtocolError> {
        let reply = self.exchange(ControlCommand::Ping, &[], MAX_FRAME_SIZE)?;
        Ok(match reply.command() {
            Some(ControlCommand::PingResponse) => Verdict::Accepted,
            _ => Verdict::Unknown,
        })
    }

    /// Switch bootloader mode.
    ///
    /// The new mode is adopted whatever the device answers, unless
    /// `strict_mode_switch` is set, in which case only `SetModeSuccess`
    /// changes it.
    #[instrument(skip(self))]
    pub fn set_mode(&mut self, mode: BootloaderMode) -> Result<Verdict, ProtocolError> {
        let reply = self.exchange(ControlCommand::SetMode, &mode.identifier(), MAX_FRAME_SIZE)?;
        let verdict = match reply.command() {
            Some(ControlCommand::SetModeSuccess) => Verdict::Accepted,
            Some(ControlCommand::SetModeFailure) => Verdict::Rejected,
            _ => Verdict::Unknown,
        };

        if self.config.strict_mode_switch && verdict != Verdict::Accepted {
            warn!(verdict = %verdict, "Device did not confirm mode switch, keeping current mode");
            return Ok(verdict);
        }
        if verdict != Verdict::Accepted {
            debug!(verdict = %verdict, "Adopting mode without confirmation");
        }

        let from = self.mode.replace(mode);
        self.framer.emit(UsbdlEvent::ModeChanged {
            from,
            to: mode,
            verdict,
        });
        Ok(verdict)
    }

    /// Ask the device to reboot.
    #[instrument(skip(self))]
    pub fn reboot(&mut self) -> Result<(), ProtocolError> {
        info!("Sending reboot command");
        self.exchange(ControlCommand::Reboot, &[], MAX_FRAME_SIZE)?;
        Ok(())
    }

    /// Read a device variable. Returns the raw reply payload.
    #[instrument(skip(self))]
    pub fn get_variable(&mut self, id: u16, buffer_size: u16) -> Result<Vec<u8>, ProtocolError> {
        let mut request = [0u8; 4];
        request[..2].copy_from_slice(&buffer_size.to_le_bytes());
        request[2..].copy_from_slice(&id.to_le_bytes());

        let max_len = MAX_FRAME_SIZE.max(buffer_size as usize + ControlMessageHeader::SIZE);
        let reply = self.exchange(ControlCommand::GetVariable, &request, max_len)?;
        debug!(len = reply.payload.len(), "Variable received");
        Ok(reply.payload)
    }

    /// Fetch the password challenge.
    #[instrument(skip(self))]
    pub fn get_password_info(&mut self) -> Result<PasswordInfo, ProtocolError> {
        let reply = self.exchange(ControlCommand::GetPasswordInfo, &[], MAX_FRAME_SIZE)?;
        if reply.is_empty() {
            return Ok(PasswordInfo::NotSet);
        }
        Ok(PasswordInfo::Challenge(ChallengeMaterial::from_payload(
            &reply.payload,
        )?))
    }

    /// Send a computed password response.
    ///
    /// The device signals success with `0x10` as the first byte of its reply.
    /// A reply whose header says `SendPasswordCorrect` without that byte is
    /// reported as `Unknown`.
    #[instrument(skip(self, response))]
    pub fn send_password(
        &mut self,
        response: &[u8; PASSWORD_RESPONSE_LEN],
    ) -> Result<Verdict, ProtocolError> {
        let reply = self.exchange(ControlCommand::SendPassword, response, MAX_FRAME_SIZE)?;
        Ok(if reply.first_byte == PASSWORD_ACCEPTED_BYTE {
            Verdict::Accepted
        } else if reply.command() == Some(ControlCommand::SendPasswordCorrect) {
            Verdict::Unknown
        } else {
            Verdict::Rejected
        })
    }

    /// Run the full password exchange.
    #[instrument(skip(self, password))]
    pub fn authenticate(&mut self, password: &str) -> Result<AuthOutcome, ProtocolError> {
        let outcome = match self.get_password_info()? {
            PasswordInfo::NotSet => {
                info!("No password set, continuing");
                AuthOutcome::NotRequired
            }
            PasswordInfo::Challenge(material) => {
                debug!(iterations = material.iterations, "Password challenge received");
                let response = compute_response(password.as_bytes(), &material);
                match self.send_password(&response)? {
                    Verdict::Accepted => AuthOutcome::Accepted,
                    Verdict::Rejected => AuthOutcome::Rejected,
                    Verdict::Unknown => AuthOutcome::Unknown,
                }
            }
        };
        self.framer.emit(UsbdlEvent::Authentication { outcome });
        Ok(outcome)
    }

    /// Send a frame on the loader channel (6-byte header).
    pub fn send_loader_message(
        &mut self,
        command: ControlCommand,
        payload: &[u8],
    ) -> Result<usize, ProtocolError> {
        let mode = self.mode_byte();
        self.framer.send(Channel::Loader, command, mode, payload)
    }

    /// Switch to RimBoot and read the identity record.
    #[instrument(skip(self))]
    pub fn read_device_info(&mut self) -> Result<DeviceInfo, ProtocolError> {
        self.set_mode(BootloaderMode::RimBoot)?;
        let raw = self.get_variable(VAR_DEVICE_INFO, DEVICE_INFO_BUFFER_SIZE)?;
        Ok(DeviceInfo::decode(&INFO_LAYOUT_V1, &raw))
    }
}
