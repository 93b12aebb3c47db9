//! Transport drivers, reader registry, and the unified scan coordinator.
//!
//! This crate owns the hardware side of the card acquisition layer. Three
//! physically unrelated channels can deliver card data: the platform
//! contactless/NFC stack, generic USB devices, and generic serial ports.
//! Each gets its own driver with an independent connection lifecycle:
//! discovery, open, continuous read loop, close, and translation of
//! platform errors into the common [`TransportError`] taxonomy.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐       ┌─────────────────┐
//! │ NFC       │──────►│                 │
//! │ read task │       │  Event channel  │
//! └───────────┘       │  (mpsc)         │
//! ┌───────────┐       │                 │──────► EventStream (application)
//! │ USB       │──────►│                 │
//! │ read task │       └─────────────────┘
//! └───────────┘               ▲
//! ┌───────────┐               │
//! │ Serial    │───────────────┘
//! │ read task │
//! └───────────┘
//! ```
//!
//! Each driver is generic over a backend trait that models the OS seam it
//! talks through (tag notifications, device enumeration and authorization,
//! port streams). Mock backends in [`mock`] drive the full stack without
//! hardware; the real backends live behind the `hardware-pcsc`,
//! `hardware-usb`, and `hardware-serial` cargo features.
//!
//! # Examples
//!
//! ```no_run
//! use tapgate_readers::{AcquireConfig, UnifiedManager, ScanEvent};
//! use tapgate_readers::mock::{MockNfc, MockSerial, MockUsb};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (nfc, _nfc_ctl) = MockNfc::new();
//! let (usb, _usb_ctl) = MockUsb::new();
//! let (serial, _serial_ctl) = MockSerial::new();
//!
//! let (mut manager, mut events) =
//!     UnifiedManager::new(nfc, usb, serial, AcquireConfig::default());
//!
//! let outcome = manager.start_scanning().await?;
//! println!("scanning on {:?}", outcome.started);
//!
//! while let Some(event) = events.recv().await {
//!     if let ScanEvent::CardDetected(card) = event {
//!         println!("{} via {}", card.uid, card.transport);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod events;
pub mod manager;
pub mod mock;
pub mod nfc;
pub mod registry;
pub mod serial;
pub mod traits;
pub mod usb;

mod session;

#[cfg(any(
    feature = "hardware-pcsc",
    feature = "hardware-usb",
    feature = "hardware-serial"
))]
pub mod hardware;

pub use config::AcquireConfig;
pub use events::ScanEvent;
pub use manager::{AcquireError, EventStream, ScanOutcome, UnifiedManager};
pub use nfc::{NfcBackend, NfcListener, NfcTransport, TagNotification};
pub use registry::ReaderRegistry;
pub use serial::{SerialBackend, SerialCandidate, SerialConnection, SerialTransport};
pub use traits::TransportDriver;
pub use usb::{UsbBackend, UsbCandidate, UsbConnection, UsbTransport};

pub use tapgate_core::{Result, TransportError};
