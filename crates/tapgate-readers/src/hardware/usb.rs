//! libusb backend for the generic USB channel.
//!
//! Bulk reads use a short bounded timeout per poll and run under
//! `spawn_blocking` with the handle taken out and returned each cycle, so
//! the owning task stays cancellable between transfers.

use crate::usb::{UsbBackend, UsbCandidate, UsbConnection};
use rusb::{DeviceHandle, GlobalContext};
use std::time::Duration;
use tapgate_core::{Result, TransportError, constants::USB_BULK_READ_TIMEOUT_MS};
use tracing::debug;

fn map_rusb(e: rusb::Error) -> TransportError {
    match e {
        rusb::Error::Access => TransportError::permission_denied(format!("usb: {e}")),
        rusb::Error::Busy => TransportError::device_busy(format!("usb: {e}")),
        rusb::Error::NoDevice | rusb::Error::NotFound => {
            TransportError::device_not_found(format!("usb: {e}"))
        }
        other => TransportError::transport_io(format!("usb: {other}")),
    }
}

fn candidate_id(device: &rusb::Device<GlobalContext>) -> String {
    format!("{}-{}", device.bus_number(), device.address())
}

fn candidate_of(device: &rusb::Device<GlobalContext>) -> Option<UsbCandidate> {
    let descriptor = device.device_descriptor().ok()?;
    // Product strings need an open handle; devices we may not open still
    // enumerate under a generic name.
    let name = device
        .open()
        .ok()
        .and_then(|h| h.read_product_string_ascii(&descriptor).ok())
        .unwrap_or_else(|| {
            format!(
                "USB device {:04x}:{:04x}",
                descriptor.vendor_id(),
                descriptor.product_id()
            )
        });
    Some(UsbCandidate {
        id: candidate_id(device),
        name,
        vendor_id: Some(descriptor.vendor_id()),
        product_id: Some(descriptor.product_id()),
    })
}

/// libusb device service.
pub struct RusbBackend;

impl RusbBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RusbBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbBackend for RusbBackend {
    type Connection = RusbConnection;

    async fn enumerate(&self) -> Result<Vec<UsbCandidate>> {
        tokio::task::spawn_blocking(|| {
            let devices = rusb::devices().map_err(map_rusb)?;
            Ok(devices.iter().filter_map(|d| candidate_of(&d)).collect())
        })
        .await
        .map_err(|e| TransportError::transport_io(format!("usb task: {e}")))?
    }

    async fn open(&mut self, id: &str) -> Result<Self::Connection> {
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let devices = rusb::devices().map_err(map_rusb)?;
            let device = devices
                .iter()
                .find(|d| candidate_id(d) == id)
                .ok_or_else(|| TransportError::device_not_found(format!("usb: {id}")))?;

            let interfaces = device
                .active_config_descriptor()
                .map(|config| config.interfaces().map(|i| i.number()).collect())
                .unwrap_or_default();
            let handle = device.open().map_err(map_rusb)?;
            // A kernel driver on the target interface blocks claims; detach
            // where the platform supports it.
            let _ = handle.set_auto_detach_kernel_driver(true);
            Ok(RusbConnection {
                handle: Some(handle),
                interfaces,
            })
        })
        .await
        .map_err(|e| TransportError::transport_io(format!("usb task: {e}")))?
    }
}

/// Open libusb device handle.
pub struct RusbConnection {
    handle: Option<DeviceHandle<GlobalContext>>,
    interfaces: Vec<u8>,
}

impl RusbConnection {
    fn take_handle(&mut self) -> Result<DeviceHandle<GlobalContext>> {
        self.handle
            .take()
            .ok_or_else(|| TransportError::invalid_state("usb handle lost mid-session"))
    }
}

impl UsbConnection for RusbConnection {
    fn interfaces(&self) -> Vec<u8> {
        self.interfaces.clone()
    }

    async fn claim_interface(&mut self, interface: u8) -> Result<()> {
        let handle = self.take_handle()?;
        let (handle, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = handle.claim_interface(interface);
            (handle, outcome)
        })
        .await
        .map_err(|e| TransportError::transport_io(format!("usb task: {e}")))?;
        self.handle = Some(handle);
        outcome.map_err(|e| TransportError::interface_unavailable(format!("usb: {e}")))
    }

    async fn read_bulk(&mut self, endpoint: u8) -> Result<Option<Vec<u8>>> {
        let handle = self.take_handle()?;
        let (handle, outcome) = tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 256];
            // IN direction bit on the endpoint address.
            let outcome = handle.read_bulk(
                0x80 | endpoint,
                &mut buf,
                Duration::from_millis(USB_BULK_READ_TIMEOUT_MS),
            );
            let outcome = outcome.map(|n| buf[..n].to_vec());
            (handle, outcome)
        })
        .await
        .map_err(|e| TransportError::transport_io(format!("usb task: {e}")))?;
        self.handle = Some(handle);

        match outcome {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(rusb::Error::Timeout) => Ok(None),
            Err(e) => {
                debug!(endpoint, error = %e, "bulk read failed");
                Err(map_rusb(e))
            }
        }
    }
}
