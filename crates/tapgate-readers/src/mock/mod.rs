//! In-memory transport backends for testing and demos.
//!
//! Each mock pairs a backend with a handle: the backend plugs into its
//! driver, the handle stays with the test and scripts hardware behavior
//! (device presence, frames, scripted failures, unplugs). No hardware or
//! OS access anywhere.

mod nfc;
mod serial;
mod usb;

pub use nfc::{MockNfc, MockNfcHandle};
pub use serial::{MockSerial, MockSerialHandle};
pub use usb::{MockUsb, MockUsbHandle};
