//! Core types for the tapgate contactless-card acquisition layer.
//!
//! This crate defines the vocabulary shared by the frame codec and the
//! transport drivers: the transport taxonomy, the canonical card event,
//! device descriptors, health snapshots, and the error types every driver
//! translates its platform failures into.
//!
//! Nothing in this crate performs I/O. The actual hardware lifecycles live
//! in `tapgate-readers`; the byte-level parsing lives in `tapgate-codec`.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Result, TransportError};
pub use types::{
    CardEvent, CardEventBuilder, CardFamily, ConnectionStatus, DeviceDescriptor, DriverStatus,
    HealthReport, TransportKind,
};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
