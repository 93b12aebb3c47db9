//! Data model shared across the acquisition layer.
//!
//! These types cross the boundary between the transport drivers, the scan
//! coordinator, and the surrounding application: device descriptors built
//! at discovery time, the canonical card event with its provenance tag, and
//! the diagnostic snapshots the registry hands out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the three independent hardware-access channels through which
/// card data can arrive.
///
/// Every emitted [`CardEvent`] carries its transport kind as a provenance
/// tag; the tag is attached by the driver that produced the event and is
/// never dropped or overwritten downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Native platform contactless/NFC channel.
    Nfc,

    /// Generic USB device channel.
    Usb,

    /// Generic serial-port channel.
    Serial,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nfc => write!(f, "NFC"),
            Self::Usb => write!(f, "USB"),
            Self::Serial => write!(f, "Serial"),
        }
    }
}

/// Connection status of a reader candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// At least one candidate device is currently reachable.
    Connected,

    /// No candidate device is reachable.
    Disconnected,

    /// The last probe or session ended in an error.
    Error,
}

/// Identifies one physical or logical reader candidate.
///
/// Created at discovery time by the owning transport driver. Status is
/// mutated only by that driver; descriptors are never shared for mutation
/// across drivers.
///
/// # Examples
///
/// ```
/// use tapgate_core::{DeviceDescriptor, TransportKind, ConnectionStatus};
///
/// let desc = DeviceDescriptor::new(TransportKind::Usb, "usb-072f:2200", "ACR122U")
///     .with_usb_ids(0x072f, 0x2200);
///
/// assert_eq!(desc.status, ConnectionStatus::Disconnected);
/// assert_eq!(desc.vendor_id, Some(0x072f));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Transport kind this candidate belongs to.
    pub transport: TransportKind,

    /// Stable identifier for the candidate (bus address, port path, ...).
    pub id: String,

    /// Human-readable device name.
    pub name: String,

    /// USB vendor identifier, when known.
    pub vendor_id: Option<u16>,

    /// USB product identifier, when known.
    pub product_id: Option<u16>,

    /// Serial-port name, for serial candidates.
    pub port_name: Option<String>,

    /// Current connection status.
    pub status: ConnectionStatus,

    /// When the candidate was last seen by a probe or a read loop.
    pub last_seen: Option<DateTime<Utc>>,
}

impl DeviceDescriptor {
    /// Create a new descriptor in the disconnected state.
    pub fn new(
        transport: TransportKind,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            id: id.into(),
            name: name.into(),
            vendor_id: None,
            product_id: None,
            port_name: None,
            status: ConnectionStatus::Disconnected,
            last_seen: None,
        }
    }

    /// Set the USB vendor/product identifiers.
    pub fn with_usb_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self.product_id = Some(product_id);
        self
    }

    /// Set the serial-port name.
    pub fn with_port_name(mut self, port_name: impl Into<String>) -> Self {
        self.port_name = Some(port_name.into());
        self
    }

    /// Update the status and refresh the last-seen timestamp.
    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
        self.last_seen = Some(Utc::now());
    }

    /// Whether the candidate is currently connected.
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Inferred card family, best-effort from the frame shape.
///
/// Classification is heuristic labeling for diagnostics and display only;
/// it is never used for security decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CardFamily {
    /// 4-byte UID, 8 hex characters.
    MifareClassic,

    /// 7-byte UID, 14 hex characters.
    MifareUltralight,

    /// Full-string hex UID of another length in the 8-16 range.
    Iso14443,

    /// Hex run embedded in surrounding vendor framing.
    GenericRfid,

    /// ATR-style diagnostic frame; the UID field holds a sentinel and the
    /// raw frame is preserved for diagnostics.
    AtrFrame,
}

impl CardFamily {
    /// Human-readable family label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MifareClassic => "MIFARE Classic",
            Self::MifareUltralight => "MIFARE Ultralight",
            Self::Iso14443 => "13.56 MHz card",
            Self::GenericRfid => "generic RFID",
            Self::AtrFrame => "ATR diagnostic frame",
        }
    }
}

impl std::fmt::Display for CardFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The canonical output of the acquisition layer.
///
/// Immutable once constructed; consumed by the external event sink.
///
/// # Examples
///
/// ```
/// use tapgate_core::{CardEvent, CardFamily, TransportKind};
///
/// let event = CardEvent::builder("04A1B2C3", CardFamily::MifareClassic, TransportKind::Nfc)
///     .manufacturer("NXP Semiconductors")
///     .build();
///
/// assert_eq!(event.uid, "04A1B2C3");
/// assert_eq!(event.transport, TransportKind::Nfc);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardEvent {
    /// Normalized uppercase hexadecimal UID (or the ATR sentinel).
    pub uid: String,

    /// Inferred card family.
    pub family: CardFamily,

    /// Inferred manufacturer, best-effort from the UID prefix.
    pub manufacturer: String,

    /// Transport that produced the event (provenance tag).
    pub transport: TransportKind,

    /// When the card was read.
    pub timestamp: DateTime<Utc>,

    /// Raw frame preserved for diagnostics (ATR-style frames only).
    pub raw_frame: Option<String>,
}

impl CardEvent {
    /// Create a builder for a card event.
    ///
    /// The manufacturer defaults to the unknown label and the timestamp to
    /// the current time; both can be overridden (timestamps mostly for
    /// replaying historical events in tests).
    pub fn builder(
        uid: impl Into<String>,
        family: CardFamily,
        transport: TransportKind,
    ) -> CardEventBuilder {
        CardEventBuilder {
            uid: uid.into(),
            family,
            transport,
            manufacturer: None,
            timestamp: None,
            raw_frame: None,
        }
    }
}

/// Builder for [`CardEvent`] with optional fields.
#[derive(Debug, Clone)]
pub struct CardEventBuilder {
    uid: String,
    family: CardFamily,
    transport: TransportKind,
    manufacturer: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    raw_frame: Option<String>,
}

impl CardEventBuilder {
    /// Set the inferred manufacturer label.
    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set a custom timestamp (defaults to now).
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Preserve the raw frame for diagnostics.
    pub fn raw_frame(mut self, raw: impl Into<String>) -> Self {
        self.raw_frame = Some(raw.into());
        self
    }

    /// Build the event.
    pub fn build(self) -> CardEvent {
        CardEvent {
            uid: self.uid,
            family: self.family,
            manufacturer: self
                .manufacturer
                .unwrap_or_else(|| crate::constants::UNKNOWN_MANUFACTURER.to_string()),
            transport: self.transport,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            raw_frame: self.raw_frame,
        }
    }
}

/// Snapshot of one driver's state for diagnostics screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStatus {
    /// Transport kind.
    pub transport: TransportKind,

    /// Driver's device name (or transport label before discovery).
    pub name: String,

    /// Whether the last availability probe found a reachable device.
    pub connected: bool,

    /// Whether a scan session is currently running.
    pub scanning: bool,
}

/// Healthy/unhealthy partition computed from live connection checks.
///
/// Hardware availability changes outside this process's control, so a
/// report is a point-in-time snapshot and must be recomputed on request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Transports whose live check passed.
    pub healthy: Vec<TransportKind>,

    /// Transports whose live check failed.
    pub unhealthy: Vec<TransportKind>,
}

impl HealthReport {
    /// Whether a specific transport passed its live check.
    pub fn is_healthy(&self, kind: TransportKind) -> bool {
        self.healthy.contains(&kind)
    }
}
