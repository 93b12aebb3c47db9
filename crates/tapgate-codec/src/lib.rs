//! CardFrame codec: pure byte-to-card-identifier parsing.
//!
//! The three transports yield short decodable frames with no common
//! protocol: vendor keyboards-wedge readers emit bare hex, PC/SC stacks
//! emit UID bytes, some serial readers wrap the UID in STX/ETX noise or
//! dump ATR-style diagnostics. This crate recovers a structured card
//! identifier from whatever arrived, using a prioritized set of pattern
//! matchers, and performs no I/O whatsoever.
//!
//! # Frame classification
//!
//! After cleaning (control characters stripped, whitespace trimmed,
//! uppercased), rules are tried in order and the first match wins:
//!
//! | Rule | Pattern | Family |
//! |------|---------|--------|
//! | 1 | exactly 8 hex chars, whole string | MIFARE Classic |
//! | 2 | exactly 14 hex chars, whole string | MIFARE Ultralight |
//! | 3 | other full-string hex run of 8-16 chars | 13.56 MHz card |
//! | 4 | hex run of length >= 8 embedded anywhere | generic RFID |
//! | 5 | >= 20 chars of hex digits and/or whitespace | ATR diagnostic frame |
//! | 6 | nothing matched | unparsable (`None`) |
//!
//! Unparsable is not an error: it is the expected outcome for noise and
//! non-card traffic, and callers log and drop it without escalating.
//!
//! # Examples
//!
//! ```
//! use tapgate_codec::FrameCodec;
//! use tapgate_core::CardFamily;
//!
//! let codec = FrameCodec::new();
//!
//! let frame = codec.parse("04A1B2C3").unwrap();
//! assert_eq!(frame.family, CardFamily::MifareClassic);
//! assert_eq!(frame.manufacturer, "NXP Semiconductors");
//!
//! assert!(codec.parse("hello world").is_none());
//! ```

pub mod frame;
pub mod manufacturer;

pub use frame::{FrameCodec, ParsedFrame, normalize_uid};
pub use manufacturer::ManufacturerTable;
