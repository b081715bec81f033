//! Property-based tests for the table record format and output handling.
//!
//! Covers record encoding length and prefix stability, output trimming, the
//! leading-integer parser, and special-character stripping.

use proptest::prelude::*;
use uuid::Uuid;

use lparctl_core::exec::{CommandOutput, parse_leading_int};
use lparctl_core::target::{SPECIAL_CHARACTERS, has_special_characters, strip_special_characters};
use lparctl_core::uuid_table::{Entry, RECORD_LEN, decode_entries, encode_entries};

// =============================================================================
// Strategies
// =============================================================================

fn arb_entry() -> impl Strategy<Value = Entry> {
    prop_oneof![
        9 => (0i32..10_000, any::<u128>()).prop_map(|(id, raw)| Entry::new(id, Uuid::from_u128(raw))),
        1 => Just(Entry::tombstone()),
    ]
}

fn arb_entries() -> impl Strategy<Value = Vec<Entry>> {
    prop::collection::vec(arb_entry(), 0..64)
}

// =============================================================================
// Record format
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn encoded_length_is_record_multiple(entries in arb_entries()) {
        prop_assert_eq!(encode_entries(&entries).len(), entries.len() * RECORD_LEN);
    }

    #[test]
    fn decoding_a_prefix_yields_the_prefix(entries in arb_entries(), cut in 0usize..64) {
        let n = cut.min(entries.len());
        let bytes = encode_entries(&entries);
        let decoded = decode_entries(&bytes, n).unwrap();
        prop_assert_eq!(&decoded[..], &entries[..n]);
    }

    #[test]
    fn asking_for_too_many_records_fails(entries in arb_entries(), extra in 1usize..8) {
        let bytes = encode_entries(&entries);
        prop_assert!(decode_entries(&bytes, entries.len() + extra).is_err());
    }

    #[test]
    fn appending_never_changes_earlier_records(entries in arb_entries(), next in arb_entry()) {
        let before = encode_entries(&entries);
        let mut grown = entries.clone();
        grown.push(next);
        let after = encode_entries(&grown);
        prop_assert_eq!(&after[..before.len()], &before[..]);
    }
}

// =============================================================================
// Command output
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn trimmed_success_has_no_newline(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let out = CommandOutput::new(bytes.clone(), 0).trimmed();
        prop_assert!(!out.output.contains(&b'\n'));
        prop_assert!(bytes.starts_with(&out.output));
    }

    #[test]
    fn trimmed_failure_is_untouched(bytes in prop::collection::vec(any::<u8>(), 0..256), code in 1i32..256) {
        let out = CommandOutput::new(bytes.clone(), code).trimmed();
        prop_assert_eq!(out.output, bytes);
    }

    #[test]
    fn leading_int_parses_any_i32(value in any::<i32>(), suffix in "[a-z ,]{0,12}") {
        let text = format!("{value}{suffix}");
        let (parsed, rest) = parse_leading_int(&text).unwrap();
        prop_assert_eq!(parsed, value);
        prop_assert_eq!(rest, suffix.as_str());
    }

    #[test]
    fn text_without_digits_has_no_int(text in "[a-zA-Z ,:]{0,20}") {
        prop_assert!(parse_leading_int(&text).is_none());
    }
}

// =============================================================================
// Special characters
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn stripped_text_has_no_special_characters(text in ".{0,40}") {
        let stripped = strip_special_characters(&text);
        prop_assert!(!has_special_characters(&stripped));
        prop_assert!(stripped.chars().all(|c| !SPECIAL_CHARACTERS.contains(&c)));
    }

    #[test]
    fn strip_is_identity_on_safe_names(text in "[A-Za-z0-9_.-]{0,40}") {
        prop_assert_eq!(strip_special_characters(&text), text);
    }
}
