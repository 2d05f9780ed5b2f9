//! Top-level tasks driven by front ends.

use std::fmt;

use anyhow::{Context, Result};
use tracing::{error, info, instrument, warn};

use crate::auth::AuthOutcome;
use crate::device_info::DeviceInfo;
use crate::loader::{LoaderStatus, begin_transfer};
use crate::protocol::BootloaderMode;
use crate::session::Session;
use crate::transport::UsbTransport;

/// What to do once the device is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Task {
    /// Dump the identity record to the configured report file.
    Info,
    /// Switch to RimBoot, then reboot.
    Reboot,
    /// Switch to RimBoot, authenticate, start the loader transfer.
    #[default]
    Send,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Info => write!(f, "info"),
            Task::Reboot => write!(f, "reboot"),
            Task::Send => write!(f, "send"),
        }
    }
}

/// What a task achieved.
#[derive(Debug, Clone)]
pub enum TaskReport {
    Info(DeviceInfo),
    Rebooted,
    Sent {
        auth: AuthOutcome,
        loader: LoaderStatus,
    },
}

/// Run `task` on an open session.
#[instrument(skip(session))]
pub fn run_task<T: UsbTransport>(session: &mut Session<T>, task: Task) -> Result<TaskReport> {
    match task {
        Task::Info => {
            let info = session.read_device_info()?;
            let path = session.config().info_path.clone();
            std::fs::write(&path, info.to_report())
                .with_context(|| format!("Failed to write {}", path))?;
            info!(path = %path, "Device info written");
            Ok(TaskReport::Info(info))
        }
        Task::Reboot => {
            info!("Setting bootloader mode...");
            session.set_mode(BootloaderMode::RimBoot)?;
            session.reboot()?;
            Ok(TaskReport::Rebooted)
        }
        Task::Send => {
            info!("Setting bootloader mode...");
            session.set_mode(BootloaderMode::RimBoot)?;

            info!("Sending the password...");
            let password = session.config().password.clone();
            let auth = session.authenticate(&password)?;
            match auth {
                AuthOutcome::NotRequired | AuthOutcome::Accepted => {
                    info!(outcome = %auth, "Password stage passed")
                }
                AuthOutcome::Rejected => error!("Failed to send correct password"),
                AuthOutcome::Unknown => warn!("Password reply was ambiguous, continuing"),
            }

            info!("Getting ready to send a loader...");
            let loader = begin_transfer(session)?;
            Ok(TaskReport::Sent { auth, loader })
        }
    }
}
