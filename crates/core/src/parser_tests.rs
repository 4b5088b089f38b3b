// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;

fn sum_box() -> AmpBox {
    AmpBox::from_pairs([("_command", "Sum"), ("_ask", "1"), ("a", "13"), ("b", "81")])
}

#[test]
fn complete_box_in_one_chunk() {
    let mut parser = BoxParser::new();
    parser.feed(&sum_box().serialize().unwrap());
    assert_eq!(parser.next_box().unwrap(), Some(sum_box()));
    assert_eq!(parser.next_box().unwrap(), None);
    assert_eq!(parser.state(), ParseState::Init);
    assert!(!parser.has_partial());
}

#[test]
fn byte_at_a_time() {
    let bytes = sum_box().serialize().unwrap();
    let mut parser = BoxParser::new();
    let mut received = Vec::new();
    for byte in &bytes {
        parser.feed(std::slice::from_ref(byte));
        while let Some(b) = parser.next_box().unwrap() {
            received.push(b);
        }
    }
    assert_eq!(received, vec![sum_box()]);
}

#[test]
fn state_follows_fields() {
    let mut parser = BoxParser::new();
    parser.feed(b"\x00\x01a");
    assert_eq!(parser.next_box().unwrap(), None);
    assert_eq!(parser.state(), ParseState::Value);

    parser.feed(b"\x00\x01b");
    assert_eq!(parser.next_box().unwrap(), None);
    assert_eq!(parser.state(), ParseState::Key);

    parser.feed(b"\x00\x00");
    assert_eq!(parser.next_box().unwrap(), Some(AmpBox::from_pairs([("a", "b")])));
    assert_eq!(parser.state(), ParseState::Init);
}

#[test]
fn oversized_key_length_is_fatal() {
    let mut parser = BoxParser::new();
    parser.feed(b"\x01\x00");
    assert_eq!(parser.next_box(), Err(FramingError::KeyTooLong { length: 256 }));
    // The stream position is lost; the error sticks.
    assert_eq!(parser.next_box(), Err(FramingError::KeyTooLong { length: 256 }));
}

#[test]
fn long_value_length_is_fine() {
    let mut parser = BoxParser::new();
    let b = AmpBox::from_pairs([(b"v".to_vec(), vec![1u8; 300])]);
    parser.feed(&b.serialize().unwrap());
    assert_eq!(parser.next_box().unwrap(), Some(b));
}

#[test]
fn bytes_after_a_box_stay_buffered() {
    let mut bytes = sum_box().serialize().unwrap();
    bytes.extend_from_slice(b"GET / HTTP/1.0\r\n");

    let mut parser = BoxParser::new();
    parser.feed(&bytes);
    assert_eq!(parser.next_box().unwrap(), Some(sum_box()));
    assert_eq!(&parser.take_buffered()[..], b"GET / HTTP/1.0\r\n");
    assert_eq!(parser.buffered_len(), 0);
}

#[test]
fn state_display() {
    assert_eq!(ParseState::Init.to_string(), "init");
    assert_eq!(ParseState::Value.to_string(), "value");
}

proptest! {
    #[test]
    fn chunking_does_not_change_result(split in 0usize..64) {
        let mut bytes = sum_box().serialize().unwrap();
        bytes.extend(AmpBox::from_pairs([("_answer", "9")]).serialize().unwrap());
        let split = split.min(bytes.len());

        let mut parser = BoxParser::new();
        let mut received = Vec::new();
        for chunk in [&bytes[..split], &bytes[split..]] {
            parser.feed(chunk);
            while let Some(b) = parser.next_box().unwrap() {
                received.push(b);
            }
        }
        prop_assert_eq!(received.len(), 2);
        prop_assert_eq!(&received[0], &sum_box());
    }
}
