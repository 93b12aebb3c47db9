//! Heuristic constants for card acquisition.
//!
//! The polling and framing values in this module are defaults, not
//! protocol truths: vendor reader hardware varies widely in how it frames
//! card data, so everything here can be overridden through the acquisition
//! configuration in `tapgate-readers`.

// ============================================================================
// UID classification
// ============================================================================

/// Minimum hexadecimal UID length (characters) for a full-string match.
pub const MIN_UID_HEX_LEN: usize = 8;

/// Maximum hexadecimal UID length (characters) for a full-string match.
pub const MAX_UID_HEX_LEN: usize = 16;

/// Exact hexadecimal length of a MIFARE Classic 4-byte UID.
pub const MIFARE_CLASSIC_HEX_LEN: usize = 8;

/// Exact hexadecimal length of a MIFARE Ultralight 7-byte UID.
pub const MIFARE_ULTRALIGHT_HEX_LEN: usize = 14;

/// Minimum length of a hex/whitespace blob treated as an ATR-style
/// diagnostic frame. This is an approximate heuristic, not an ATR parser.
pub const ATR_FRAME_MIN_LEN: usize = 20;

/// Sentinel UID emitted for ATR-style diagnostic frames. The raw frame is
/// preserved on the event for diagnostics.
pub const ATR_UID_SENTINEL: &str = "ATR-format";

/// Manufacturer label for UID prefixes missing from the lookup table.
pub const UNKNOWN_MANUFACTURER: &str = "unknown manufacturer";

// ============================================================================
// USB transport defaults
// ============================================================================

/// Default interval between USB endpoint polls, in milliseconds.
pub const DEFAULT_USB_POLL_INTERVAL_MS: u64 = 1000;

/// Default endpoint numbers polled round-robin on the USB transport.
pub const DEFAULT_USB_ENDPOINTS: [u8; 5] = [1, 2, 3, 4, 5];

/// Per-poll bulk read timeout, in milliseconds. A poll that yields nothing
/// within this window is silence, not an error.
pub const USB_BULK_READ_TIMEOUT_MS: u64 = 200;

/// Name/vendor hints that mark a USB device as a likely card reader.
pub const USB_READER_KEYWORDS: [&str; 10] = [
    "nfc",
    "rfid",
    "card reader",
    "acr122",
    "pn532",
    "mifare",
    "proximity",
    "contactless",
    "smart card",
    "hid-compliant",
];

// ============================================================================
// Serial transport defaults
// ============================================================================

/// Default serial baud rate (8 data bits, 1 stop bit, no parity).
pub const DEFAULT_SERIAL_BAUD: u32 = 9600;

/// Maximum serial open attempts before the start fails.
pub const SERIAL_OPEN_ATTEMPTS: u32 = 3;

/// Linear backoff step between serial open attempts, in milliseconds
/// (1s, 2s, 3s).
pub const SERIAL_BACKOFF_STEP_MS: u64 = 1000;

// ============================================================================
// Event channel
// ============================================================================

/// Default capacity of the unified scan event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 100;
