//! Real hardware backends, one per cargo feature.
//!
//! All three wrap blocking OS libraries, so every call that can block
//! runs under `spawn_blocking` with a bounded wait per cycle; the async
//! read loops stay cancellable between cycles.

#[cfg(feature = "hardware-pcsc")]
mod pcsc;
#[cfg(feature = "hardware-serial")]
mod serial;
#[cfg(feature = "hardware-usb")]
mod usb;

#[cfg(feature = "hardware-pcsc")]
pub use pcsc::PcscNfc;
#[cfg(feature = "hardware-serial")]
pub use serial::SerialportBackend;
#[cfg(feature = "hardware-usb")]
pub use usb::RusbBackend;
