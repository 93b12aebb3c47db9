//! Acquisition configuration.
//!
//! The USB endpoint set, polling interval, and serial retry schedule are
//! vendor heuristics with no documented derivation, so they are carried
//! here as configurable defaults rather than fixed truths.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tapgate_core::constants::{
    DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_SERIAL_BAUD, DEFAULT_USB_ENDPOINTS,
    DEFAULT_USB_POLL_INTERVAL_MS, SERIAL_BACKOFF_STEP_MS, SERIAL_OPEN_ATTEMPTS,
    USB_READER_KEYWORDS,
};

/// Tunables for the three transport drivers and the event channel.
///
/// # Examples
///
/// ```
/// use tapgate_readers::AcquireConfig;
///
/// let config = AcquireConfig {
///     usb_poll_interval_ms: 250,
///     ..AcquireConfig::default()
/// };
/// assert_eq!(config.usb_endpoints, vec![1, 2, 3, 4, 5]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireConfig {
    /// Interval between USB endpoint polls, in milliseconds.
    pub usb_poll_interval_ms: u64,

    /// Endpoint numbers polled round-robin on the USB transport.
    pub usb_endpoints: Vec<u8>,

    /// Name/vendor hints marking a USB device as a likely card reader.
    pub usb_keywords: Vec<String>,

    /// Serial baud rate (framing is fixed at 8 data bits, 1 stop bit,
    /// no parity).
    pub serial_baud: u32,

    /// Maximum serial open attempts before the start fails.
    pub serial_open_attempts: u32,

    /// Linear backoff step between serial open attempts, in milliseconds.
    pub serial_backoff_step_ms: u64,

    /// Capacity of the unified scan event channel.
    pub event_channel_capacity: usize,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            usb_poll_interval_ms: DEFAULT_USB_POLL_INTERVAL_MS,
            usb_endpoints: DEFAULT_USB_ENDPOINTS.to_vec(),
            usb_keywords: USB_READER_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            serial_baud: DEFAULT_SERIAL_BAUD,
            serial_open_attempts: SERIAL_OPEN_ATTEMPTS,
            serial_backoff_step_ms: SERIAL_BACKOFF_STEP_MS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl AcquireConfig {
    /// USB poll interval as a [`Duration`].
    pub fn usb_poll_interval(&self) -> Duration {
        Duration::from_millis(self.usb_poll_interval_ms)
    }

    /// Backoff before retry `attempt` (1-based): linear in the step.
    pub fn serial_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.serial_backoff_step_ms * u64::from(attempt))
    }
}
