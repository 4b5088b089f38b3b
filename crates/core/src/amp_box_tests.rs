// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Box serialization, limits and marker classification.

use proptest::prelude::*;

use super::*;

#[test]
fn serialize_single_pair() {
    let b = AmpBox::from_pairs([("a", "b")]);
    assert_eq!(b.serialize().unwrap(), b"\x00\x01a\x00\x01b\x00\x00");
}

#[test]
fn serialize_empty_box_is_just_terminator() {
    assert_eq!(AmpBox::new().serialize().unwrap(), b"\x00\x00");
}

#[test]
fn serialize_orders_keys() {
    let b = AmpBox::from_pairs([("zz", "1"), ("aa", "2")]);
    assert_eq!(b.serialize().unwrap(), b"\x00\x02aa\x00\x012\x00\x02zz\x00\x011\x00\x00");
}

#[test]
fn serialize_allows_empty_values() {
    let b = AmpBox::from_pairs([("k", "")]);
    assert_eq!(b.serialize().unwrap(), b"\x00\x01k\x00\x00\x00\x00");
}

#[test]
fn key_of_256_bytes_is_too_long() {
    let b = AmpBox::from_pairs([(vec![b'k'; 256], b"v".to_vec())]);
    assert_eq!(
        b.serialize(),
        Err(BoxError::TooLong { is_key: true, length: 256, key: None })
    );
}

#[test]
fn key_of_255_bytes_is_accepted() {
    let b = AmpBox::from_pairs([(vec![b'k'; 255], b"v".to_vec())]);
    let bytes = b.serialize().unwrap();
    assert_eq!(parse_boxes(&bytes).unwrap(), vec![b]);
}

#[test]
fn value_of_65536_bytes_is_too_long() {
    let b = AmpBox::from_pairs([(b"big".to_vec(), vec![0u8; 65536])]);
    let err = b.serialize().unwrap_err();
    assert_eq!(
        err,
        BoxError::TooLong { is_key: false, length: 65536, key: Some(b"big".to_vec()) }
    );
    assert_eq!(err.to_string(), "local value big too long: 65536");
}

#[test]
fn value_of_65535_bytes_is_accepted() {
    let b = AmpBox::from_pairs([(b"big".to_vec(), vec![7u8; 65535])]);
    assert!(b.serialize().is_ok());
}

#[test]
fn empty_key_is_rejected() {
    let b = AmpBox::from_pairs([("", "v")]);
    assert_eq!(b.serialize(), Err(BoxError::EmptyKey));
}

#[test]
fn parse_several_boxes() {
    let mut bytes = AmpBox::from_pairs([("a", "1")]).serialize().unwrap();
    bytes.extend(AmpBox::from_pairs([("b", "2"), ("c", "")]).serialize().unwrap());
    let boxes = parse_boxes(&bytes).unwrap();
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[0].get(b"a"), Some(&b"1"[..]));
    assert_eq!(boxes[1].get(b"c"), Some(&b""[..]));
}

#[test]
fn parse_rejects_trailing_partial_box() {
    let mut bytes = AmpBox::from_pairs([("a", "1")]).serialize().unwrap();
    bytes.extend_from_slice(b"\x00\x05ab");
    assert_eq!(parse_boxes(&bytes), Err(FramingError::Truncated { remaining: 4 }));
}

#[test]
fn kind_of_answer() {
    let b = AmpBox::from_pairs([("_answer", "1"), ("total", "94")]);
    assert_eq!(b.kind().unwrap(), BoxKind::Answer(b"1"));
}

#[test]
fn kind_of_error() {
    let b = AmpBox::from_pairs([("_error", "2"), ("_error_code", "X")]);
    assert_eq!(b.kind().unwrap(), BoxKind::Error(b"2"));
}

#[test]
fn kind_of_command_with_and_without_ask() {
    let asked = AmpBox::from_pairs([("_command", "Sum"), ("_ask", "3")]);
    assert_eq!(asked.kind().unwrap(), BoxKind::Command { name: b"Sum", ask: Some(&b"3"[..]) });

    let told = AmpBox::from_pairs([("_command", "Sum")]);
    assert_eq!(told.kind().unwrap(), BoxKind::Command { name: b"Sum", ask: None });
}

#[yare::parameterized(
    no_markers = { &[("a", "b")] },
    ask_alone = { &[("_ask", "1")] },
)]
fn unmarked_boxes(pairs: &[(&str, &str)]) {
    let b = AmpBox::from_pairs(pairs.iter().copied());
    assert_eq!(b.validate_markers(), Err(BoxError::Unmarked));
}

#[yare::parameterized(
    answer_and_error = { &[("_answer", "1"), ("_error", "1")] },
    answer_and_command = { &[("_answer", "1"), ("_command", "X")] },
    ask_on_answer = { &[("_answer", "1"), ("_ask", "1")] },
)]
fn malformed_markers(pairs: &[(&str, &str)]) {
    let b = AmpBox::from_pairs(pairs.iter().copied());
    assert!(matches!(b.validate_markers(), Err(BoxError::MalformedBox(_))));
}

#[test]
fn debug_escapes_binary() {
    let b = AmpBox::from_pairs([(b"k".to_vec(), vec![0u8, b'A'])]);
    assert_eq!(format!("{b:?}"), r#"{"k": "\\x00A"}"#);
}

fn arb_box() -> impl Strategy<Value = AmpBox> {
    prop::collection::btree_map(
        prop::collection::vec(any::<u8>(), 1..=255),
        prop::collection::vec(any::<u8>(), 0..512),
        0..8,
    )
    .prop_map(|entries| AmpBox::from_pairs(entries))
}

proptest! {
    #[test]
    fn parse_inverts_serialize(boxes in prop::collection::vec(arb_box(), 0..4)) {
        let mut bytes = Vec::new();
        for b in &boxes {
            bytes.extend(b.serialize().unwrap());
        }
        prop_assert_eq!(parse_boxes(&bytes).unwrap(), boxes);
    }
}
