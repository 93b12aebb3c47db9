//! Property-based tests for the CardFrame codec.
//!
//! These tests use proptest to generate random payloads and verify that
//! the classification invariants hold for all inputs, not just the
//! hand-picked fixtures in the unit tests.

use proptest::prelude::*;
use tapgate_codec::{FrameCodec, ManufacturerTable, normalize_uid};
use tapgate_core::CardFamily;

/// Strategy for hex strings of a fixed length.
fn hex_string(len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select("0123456789abcdefABCDEF".as_bytes().to_vec()), len)
        .prop_map(|bytes| bytes.into_iter().map(|b| b as char).collect())
}

proptest! {
    #[test]
    fn normalize_is_idempotent(s in "\\PC*") {
        let once = normalize_uid(&s);
        prop_assert_eq!(normalize_uid(&once), once);
    }

    #[test]
    fn eight_hex_chars_classify_as_mifare_classic(uid in hex_string(8)) {
        let codec = FrameCodec::new();
        let frame = codec.parse(&uid).unwrap();
        prop_assert_eq!(frame.family, CardFamily::MifareClassic);
        prop_assert_eq!(frame.uid, uid.to_ascii_uppercase());
    }

    #[test]
    fn fourteen_hex_chars_classify_as_mifare_ultralight(uid in hex_string(14)) {
        let codec = FrameCodec::new();
        let frame = codec.parse(&uid).unwrap();
        prop_assert_eq!(frame.family, CardFamily::MifareUltralight);
    }

    #[test]
    fn other_full_hex_runs_stay_generic(len in 9usize..=16) {
        prop_assume!(len != 14);
        let uid = "A".repeat(len);
        let codec = FrameCodec::new();
        let frame = codec.parse(&uid).unwrap();
        prop_assert_eq!(frame.family, CardFamily::Iso14443);
    }

    #[test]
    fn manufacturer_lookup_never_fails(uid in "\\PC*") {
        let table = ManufacturerTable::new();
        // Total function: any input yields a label, unknown included.
        let label = table.lookup(&uid);
        prop_assert!(!label.is_empty());
    }

    #[test]
    fn parse_never_panics_on_arbitrary_input(payload in "\\PC*") {
        let codec = FrameCodec::new();
        let _ = codec.parse(&payload);
    }

    #[test]
    fn emitted_uids_are_already_normalized(payload in "\\PC*") {
        let codec = FrameCodec::new();
        // ATR frames carry the fixed sentinel instead of a hex UID.
        if let Some(frame) = codec.parse(&payload)
            && frame.family != CardFamily::AtrFrame
        {
            prop_assert_eq!(normalize_uid(&frame.uid), frame.uid);
        }
    }
}
