//! Unified event stream types.
//!
//! All drivers send their output through this enum so the application
//! consumes one stream regardless of which hardware channel produced the
//! data. The transport provenance tag is attached by the producing driver
//! and is never dropped or overwritten downstream.

use tapgate_codec::ParsedFrame;
use tapgate_core::constants::UNKNOWN_MANUFACTURER;
use tapgate_core::{CardEvent, TransportKind};
use tracing::debug;

/// Unified event from any transport driver.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScanEvent {
    /// A card identifier was recovered from a transport payload.
    CardDetected(CardEvent),

    /// A transport reported a non-fatal error. The driver keeps scanning
    /// unless its stream signaled definitive closure.
    TransportError {
        /// Transport that reported the error.
        transport: TransportKind,

        /// Error description.
        message: String,
    },

    /// A read loop ended on its own because the underlying stream closed.
    /// This is a stop, not a crash; explicit `stop_scan` calls do not emit
    /// this event.
    ScanStopped {
        /// Transport whose session ended.
        transport: TransportKind,
    },
}

/// Promote a parsed frame to a card event tagged with its provenance.
pub(crate) fn frame_to_event(frame: ParsedFrame, transport: TransportKind) -> CardEvent {
    if frame.manufacturer == UNKNOWN_MANUFACTURER {
        debug!(transport = %transport, uid = %frame.uid, "manufacturer lookup miss");
    }
    let mut builder = CardEvent::builder(frame.uid, frame.family, transport)
        .manufacturer(frame.manufacturer);
    if let Some(raw) = frame.raw_frame {
        builder = builder.raw_frame(raw);
    }
    builder.build()
}
