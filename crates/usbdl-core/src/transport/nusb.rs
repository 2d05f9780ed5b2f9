//! nusb-based USB transport implementation.

use nusb::transfer::{Bulk, In, Out};
use nusb::{Interface, MaybeFuture, list_devices};
use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{BOOTLOADER_INTERFACE, BULK_IN_ENDPOINT, BULK_OUT_ENDPOINT};

/// nusb-based USB transport.
///
/// Owns the claimed interface for its whole lifetime; dropping it releases
/// the interface and closes the device.
pub struct NusbTransport {
    interface: Interface,
    in_endpoint: u8,
    out_endpoint: u8,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open a device with specific VID/PID and claim interface 0.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open_device_info(device_info)
    }

    /// Poll enumeration until the device shows up, then open it.
    ///
    /// A `timeout` of `None` waits forever.
    pub fn wait_for(
        vid: u16,
        pid: u16,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        info!(
            "Waiting for device 0x{:04x}:0x{:04x} to be connected...",
            vid, pid
        );
        let start = Instant::now();
        let mut poll_count = 0u64;

        loop {
            poll_count += 1;

            match Self::open_with_ids(vid, pid) {
                Ok(t) => {
                    info!("Device found after {} polls", poll_count);
                    return Ok(t);
                }
                Err(TransportError::DeviceNotFound { .. }) => {
                    if let Some(limit) = timeout
                        && start.elapsed() > limit
                    {
                        return Err(TransportError::DeviceNotFound { vid, pid });
                    }
                    thread::sleep(poll_interval);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface = device
            .claim_interface(BOOTLOADER_INTERFACE)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: BOOTLOADER_INTERFACE,
                message: e.to_string(),
            })?;

        info!(
            interface = BOOTLOADER_INTERFACE,
            in_ep = %format!("0x{:02X}", BULK_IN_ENDPOINT),
            out_ep = %format!("0x{:02X}", BULK_OUT_ENDPOINT),
            "Interface claimed"
        );

        Ok(Self {
            interface,
            in_endpoint: BULK_IN_ENDPOINT,
            out_endpoint: BULK_OUT_ENDPOINT,
            vid,
            pid,
        })
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, Out>(self.out_endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        let mut writer = ep.writer(4096).with_write_timeout(timeout);
        writer
            .write_all(data)
            .map_err(|e| TransportError::from_io(e, self.out_endpoint, timeout))?;
        writer
            .flush()
            .map_err(|e| TransportError::from_io(e, self.out_endpoint, timeout))?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    #[instrument(skip(self))]
    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let ep = self
            .interface
            .endpoint::<Bulk, In>(self.in_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        let mut reader = ep.reader(4096).with_read_timeout(timeout);
        let mut buf = vec![0u8; max_len];

        let n = reader
            .read(&mut buf)
            .map_err(|e| TransportError::from_io(e, self.in_endpoint, timeout))?;

        buf.truncate(n);
        debug!(bytes_read = n, "Read complete");
        Ok(buf)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
