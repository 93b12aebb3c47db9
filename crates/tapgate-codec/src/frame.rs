//! Ordered pattern matching from cleaned payloads to card identifiers.

use crate::manufacturer::ManufacturerTable;
use tapgate_core::CardFamily;
use tapgate_core::constants::{
    ATR_FRAME_MIN_LEN, ATR_UID_SENTINEL, MAX_UID_HEX_LEN, MIFARE_CLASSIC_HEX_LEN,
    MIFARE_ULTRALIGHT_HEX_LEN, MIN_UID_HEX_LEN,
};

/// A card identifier recovered from one transport payload.
///
/// This is the codec-side body of a card event: the driver that owns the
/// payload attaches its transport provenance tag and timestamp when it
/// promotes the frame to a `CardEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    /// Normalized uppercase hex UID, or the ATR sentinel.
    pub uid: String,

    /// Inferred card family.
    pub family: CardFamily,

    /// Inferred manufacturer label.
    pub manufacturer: String,

    /// Raw cleaned frame, preserved for ATR-style diagnostic frames.
    pub raw_frame: Option<String>,
}

/// Strip control characters and line terminators, then trim whitespace.
///
/// Interior whitespace survives: spaced ATR-style dumps like
/// `"3B 8F 80 01 ..."` keep their grouping.
pub fn clean_payload(payload: &str) -> String {
    let stripped: String = payload.chars().filter(|c| !c.is_control()).collect();
    stripped.trim().to_string()
}

/// Normalize a UID: trim surrounding whitespace and uppercase.
///
/// Idempotent: `normalize_uid(normalize_uid(x)) == normalize_uid(x)`.
pub fn normalize_uid(uid: &str) -> String {
    uid.trim().to_ascii_uppercase()
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// First maximal run of hex digits with length >= `min_len`.
fn first_hex_run(s: &str, min_len: usize) -> Option<&str> {
    let mut run_start = None;
    for (i, c) in s.char_indices() {
        match (c.is_ascii_hexdigit(), run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                if i - start >= min_len {
                    return Some(&s[start..i]);
                }
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start
        && s.len() - start >= min_len
    {
        return Some(&s[start..]);
    }
    None
}

/// Pattern-matching codec turning opaque payloads into [`ParsedFrame`]s.
///
/// Stateless apart from its manufacturer table; cheap to clone, so every
/// transport driver carries its own copy.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    manufacturers: ManufacturerTable,
}

impl FrameCodec {
    /// Create a codec with the builtin manufacturer table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with an extended manufacturer table.
    pub fn with_manufacturers(manufacturers: ManufacturerTable) -> Self {
        Self { manufacturers }
    }

    /// Attempt to recover a card identifier from a raw payload.
    ///
    /// Returns `None` when no pattern matches ("unparsable"). Callers log
    /// and discard that outcome; it is indistinguishable from "no card
    /// present" at every layer above the driver.
    ///
    /// # Examples
    ///
    /// ```
    /// use tapgate_codec::FrameCodec;
    /// use tapgate_core::CardFamily;
    ///
    /// let codec = FrameCodec::new();
    ///
    /// // Control characters and whitespace are cleaned before matching.
    /// let frame = codec.parse("  \u{0000} 1234ABCD5678EF\n").unwrap();
    /// assert_eq!(frame.uid, "1234ABCD5678EF");
    /// assert_eq!(frame.family, CardFamily::MifareUltralight);
    /// ```
    pub fn parse(&self, payload: &str) -> Option<ParsedFrame> {
        let cleaned = clean_payload(payload);
        if cleaned.is_empty() {
            return None;
        }
        let upper = normalize_uid(&cleaned);

        // Full-string hex runs. Exact MIFARE lengths take precedence over
        // the generic 8-16 range so a 4-byte or 7-byte UID keeps its
        // family label.
        if is_hex(&upper) {
            match upper.len() {
                MIFARE_CLASSIC_HEX_LEN => {
                    return Some(self.frame(upper, CardFamily::MifareClassic));
                }
                MIFARE_ULTRALIGHT_HEX_LEN => {
                    return Some(self.frame(upper, CardFamily::MifareUltralight));
                }
                len if (MIN_UID_HEX_LEN..=MAX_UID_HEX_LEN).contains(&len) => {
                    return Some(self.frame(upper, CardFamily::Iso14443));
                }
                _ => {}
            }
        }

        // Hex run embedded in vendor framing.
        if let Some(run) = first_hex_run(&upper, MIN_UID_HEX_LEN) {
            return Some(self.frame(run.to_string(), CardFamily::GenericRfid));
        }

        // Long hex/whitespace blob: treat as an ATR-style diagnostic frame.
        // Approximate heuristic only; no structural ATR validation.
        if upper.len() >= ATR_FRAME_MIN_LEN
            && upper
                .chars()
                .all(|c| c.is_ascii_hexdigit() || c.is_whitespace())
        {
            return Some(ParsedFrame {
                uid: ATR_UID_SENTINEL.to_string(),
                family: CardFamily::AtrFrame,
                manufacturer: self.manufacturers.lookup("").to_string(),
                raw_frame: Some(cleaned),
            });
        }

        None
    }

    fn frame(&self, uid: String, family: CardFamily) -> ParsedFrame {
        let manufacturer = self.manufacturers.lookup(&uid).to_string();
        ParsedFrame {
            uid,
            family,
            manufacturer,
            raw_frame: None,
        }
    }
}
