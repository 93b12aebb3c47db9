//! Error types for transport operations.
//!
//! Every transport driver translates its platform-specific failures into
//! [`TransportError`] so that the registry and the scan coordinator reason
//! about one taxonomy regardless of which hardware channel failed.
//!
//! Parse failures are deliberately absent: an unparsable payload is the
//! expected outcome for noise on the wire, is logged and dropped inside the
//! read loop, and must not be distinguishable from "no card present" at any
//! higher layer.

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while opening or reading a card-reader channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No candidate device could be enumerated or opened.
    #[error("no candidate device found: {detail}")]
    DeviceNotFound { detail: String },

    /// The user or the OS refused access to the device.
    #[error("device access denied: {detail}")]
    PermissionDenied { detail: String },

    /// The device is held by another process or lacks a usable OS driver.
    #[error("device busy or no usable driver: {detail}")]
    DeviceBusy { detail: String },

    /// The device or port reported an invalid or unexpected state on open.
    #[error("invalid device state: {detail}")]
    InvalidState { detail: String },

    /// No claimable USB interface was found. Scanning proceeds without a
    /// claimed interface, so this never terminates a start attempt.
    #[error("no claimable USB interface: {detail}")]
    InterfaceUnavailable { detail: String },

    /// A read or write to an already-open device failed mid-session.
    #[error("transport I/O failure: {detail}")]
    TransportIo { detail: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Create a new device-not-found error.
    pub fn device_not_found(detail: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            detail: detail.into(),
        }
    }

    /// Create a new permission-denied error.
    pub fn permission_denied(detail: impl Into<String>) -> Self {
        Self::PermissionDenied {
            detail: detail.into(),
        }
    }

    /// Create a new device-busy error.
    pub fn device_busy(detail: impl Into<String>) -> Self {
        Self::DeviceBusy {
            detail: detail.into(),
        }
    }

    /// Create a new invalid-state error.
    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::InvalidState {
            detail: detail.into(),
        }
    }

    /// Create a new interface-unavailable error.
    pub fn interface_unavailable(detail: impl Into<String>) -> Self {
        Self::InterfaceUnavailable {
            detail: detail.into(),
        }
    }

    /// Create a new mid-session transport I/O error.
    pub fn transport_io(detail: impl Into<String>) -> Self {
        Self::TransportIo {
            detail: detail.into(),
        }
    }

    /// Whether a fresh open attempt is worth retrying after backoff.
    ///
    /// Only busy devices qualify: a missing device, a refused grant, or an
    /// invalid port state will not resolve within a bounded backoff window.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeviceBusy { .. })
    }
}
