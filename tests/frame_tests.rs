//! Integration tests for the frame layer: parsing, packing, verification and
//! the telegram view used by the data block decoder.

mod common;

use common::*;
use mbus_decode::mbus::frame::{
    calculate_checksum, decode_frame, expected_frame_len, pack_frame, parse_frame, verify_frame,
    MBusFrame, MBusFrameType,
};
use mbus_decode::{decode_telegram, ErrorCategory, MBusError, MBusMessage};

/// Tests that an ACK frame is correctly parsed.
#[test]
fn test_parse_ack_frame() {
    let (rest, frame) = parse_frame(&[0xE5]).unwrap();
    assert!(rest.is_empty());
    assert_eq!(frame, MBusFrame::ack());
}

/// Tests that a Short frame is correctly parsed.
#[test]
fn test_parse_short_frame() {
    let frame_data = &[0x10, 0x53, 0x01, 0x54, 0x16];
    let (_, frame) = parse_frame(frame_data).unwrap();
    assert_eq!(frame.frame_type, MBusFrameType::Short);
    assert_eq!(frame.control, 0x53);
    assert_eq!(frame.address, 0x01);
    assert_eq!(frame.checksum, 0x54);
    verify_frame(&frame).unwrap();
}

/// Tests that a Control frame is correctly parsed.
#[test]
fn test_parse_control_frame() {
    let frame_data = &[0x68, 0x03, 0x03, 0x68, 0x53, 0x01, 0x00, 0x54, 0x16];
    let (_, frame) = parse_frame(frame_data).unwrap();
    assert_eq!(frame.frame_type, MBusFrameType::Control);
    assert!(frame.data.is_empty());
    assert_eq!(calculate_checksum(&frame), 0x54);
}

#[test]
fn test_parse_leaves_trailing_bytes() {
    let mut bytes = hex_to_bytes(APPLICATION_BUSY_HEX);
    bytes.extend([0xE5, 0x00]);
    let (rest, frame) = parse_frame(&bytes).unwrap();
    assert_eq!(rest, &[0xE5, 0x00]);
    assert_eq!(frame.control_information, 0x70);
}

#[test]
fn test_expected_frame_len() {
    assert_eq!(expected_frame_len(&[0xE5]), Some(1));
    assert_eq!(expected_frame_len(&[0x10]), Some(5));
    assert_eq!(expected_frame_len(&[0x68, 0x31]), Some(55));
    assert_eq!(expected_frame_len(&[0x68]), None);
    assert_eq!(expected_frame_len(&[0x42]), None);
    assert_eq!(expected_frame_len(&[]), None);
}

#[test]
fn test_pack_long_frame() {
    let frame = MBusFrame::long(0x08, 0x01, 0x70, vec![0x08]).unwrap();
    assert_eq!(pack_frame(&frame).unwrap(), hex_to_bytes(APPLICATION_BUSY_HEX));
}

#[test]
fn test_message_decode_uses_length_window() {
    let mut bytes = hex_to_bytes(EXAMPLE_DATA_01_HEX);
    let length = bytes.len();
    bytes.extend([0xAA; 8]);

    let message = MBusMessage::decode(&bytes, length).unwrap();
    assert_eq!(message.payload().len(), 0x31 - 3);
}

#[test]
fn test_every_single_byte_corruption_is_detected() {
    let bytes = hex_to_bytes(EXAMPLE_DATA_01_HEX);
    for i in 4..bytes.len() - 2 {
        let mut corrupt = bytes.clone();
        corrupt[i] ^= 0x10;
        let err = decode_frame(&corrupt).unwrap_err();
        assert!(
            matches!(err, MBusError::ChecksumMismatch { .. }),
            "byte {i}: {err:?}"
        );
        assert_eq!(err.category(), ErrorCategory::CorruptFrame);
    }
}

#[test]
fn test_truncated_telegram() {
    let bytes = hex_to_bytes(EXAMPLE_DATA_01_HEX);
    let err = decode_telegram(&bytes[..30]).unwrap_err();
    assert!(matches!(err, MBusError::TruncatedFrame { available: 30, .. }));
    assert_eq!(err.category(), ErrorCategory::CorruptFrame);
}

#[test]
fn test_decode_telegram() {
    let vds = decode_telegram(&hex_to_bytes(EFE_ENGELMANN_HEX)).unwrap();
    assert_eq!(vds.records().len(), 25);
    assert_eq!(vds.control_information(), 0x72);
}
