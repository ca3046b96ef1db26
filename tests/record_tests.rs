mod common;

use chrono::FixedOffset;
use common::hex_to_bytes;
use mbus_decode::payload::data_encoding::{decode_bcd, decode_int, encode_bcd, encode_int};
use mbus_decode::{DataRecord, DataValue, DataValueType, Description, DlmsUnit, MBusError};
use proptest::prelude::*;

fn decode(hex: &str) -> DataRecord {
    DataRecord::decode_from(&hex_to_bytes(hex), 0).unwrap().0
}

fn long_value(hex: &str) -> i64 {
    let record = decode(hex);
    assert_eq!(record.data_value_type(), DataValueType::Long);
    match record.data_value() {
        DataValue::Long(v) => *v,
        other => panic!("expected an integer, got {other:?}"),
    }
}

#[test]
fn test_int64_values() {
    assert_eq!(long_value("0704FFFFFFFFFFFFFFFF"), -1);
    assert_eq!(long_value("07041223344556677812"), 1330927310113874706);
}

#[test]
fn test_signed_integer_widths() {
    assert_eq!(long_value("0203ff7f"), i16::MAX as i64);
    assert_eq!(long_value("0203ffff"), -1);
    assert_eq!(long_value("0303ffff7f"), 8_388_607);
    assert_eq!(long_value("0303ffffff"), -1);
    assert_eq!(long_value("0403ffffff7f"), i32::MAX as i64);
    assert_eq!(long_value("0403ffffffff"), -1);
    assert_eq!(long_value("0603ffffffffff7f"), 140737488355327);
    assert_eq!(long_value("0603ffffffffffff"), -1);
    assert_eq!(long_value("0703ffffffffffffff7f"), i64::MAX);
    assert_eq!(long_value("0703ffffffffffffffff"), -1);
}

#[test]
fn test_catalog_records() {
    let cases: [(&str, Description, Option<DlmsUnit>, i32, i64); 8] = [
        ("0407c81e0000", Description::Energy, Some(DlmsUnit::WattHour), 4, 7880),
        ("0415febf0000", Description::Volume, Some(DlmsUnit::CubicMetre), -1, 49150),
        ("844015f8bf0000", Description::Volume, Some(DlmsUnit::CubicMetre), -1, 49144),
        ("042238090000", Description::OnTime, Some(DlmsUnit::Hour), 0, 2360),
        ("04263d070000", Description::OperatingTime, Some(DlmsUnit::Hour), 0, 1853),
        ("025a7902", Description::FlowTemperature, Some(DlmsUnit::DegreeCelsius), -1, 633),
        ("025ea601", Description::ReturnTemperature, Some(DlmsUnit::DegreeCelsius), -1, 422),
        ("0262d300", Description::TemperatureDifference, Some(DlmsUnit::Kelvin), -1, 211),
    ];

    for (hex, description, unit, exponent, value) in cases {
        let record = decode(hex);
        assert_eq!(record.description(), description, "{hex}");
        assert_eq!(record.unit(), unit, "{hex}");
        assert_eq!(record.multiplier_exponent(), exponent, "{hex}");
        assert_eq!(record.data_value(), &DataValue::Long(value), "{hex}");
    }
}

#[test]
fn test_date_time_record() {
    let record = decode("046d2b117811");
    assert_eq!(record.description(), Description::DateTime);
    assert_eq!(record.unit(), None);
    assert_eq!(record.multiplier_exponent(), 0);
    assert_eq!(record.scaler(), None);

    let DataValue::Date(dt) = record.data_value() else {
        panic!("expected a date");
    };
    let cet = FixedOffset::east_opt(3600).unwrap();
    let millis = dt.timestamp_millis(cet).unwrap();
    assert!((millis - 1295887380035).abs() <= 100);
}

#[test]
fn test_scaled_value() {
    let record = decode("0415febf0000");
    assert!((record.scaled_value().unwrap() - 4915.0).abs() < 1e-9);
}

#[test]
fn test_subunit_from_dife() {
    let record = decode("844015f8bf0000");
    assert_eq!(record.storage_number(), 0);
    assert_eq!(record.subunit(), 1);
    assert_eq!(record.dib(), &[0x84, 0x40]);
    assert_eq!(record.vib(), &[0x15]);
}

#[test]
fn test_lvar_bcd_twenty_digits() {
    let mut bytes = hex_to_bytes("0d13c9");
    bytes.extend([0x99; 10]);
    let (record, consumed) = DataRecord::decode_from(&bytes, 0).unwrap();
    assert_eq!(consumed, 13);
    assert_eq!(record.data_value_type(), DataValueType::Bcd);

    let DataValue::Bcd(bcd) = record.data_value() else {
        panic!("expected BCD");
    };
    assert_eq!(bcd.value(), 99_999_999_999_999_999_999);
    assert_eq!(bcd.digits(), 20);
    assert_eq!(bcd.to_string(), "99999999999999999999");

    bytes[2] = 0xD9;
    let (record, _) = DataRecord::decode_from(&bytes, 0).unwrap();
    assert_eq!(record.data_value().as_f64(), Some(-1e20));
}

#[test]
fn test_truncated_value_leaves_record_untouched() {
    let mut record = DataRecord::new();
    let result = record.decode(&hex_to_bytes("0407c81e00"), 0);
    assert!(matches!(result, Err(MBusError::TruncatedBuffer { .. })));
    assert_eq!(record, DataRecord::new());
}

#[test]
fn test_truncated_header() {
    let result = DataRecord::decode_from(&hex_to_bytes("84"), 0);
    assert!(matches!(result, Err(MBusError::TruncatedBuffer { .. })));
}

#[test]
fn test_decode_at_offset() {
    let buffer = hex_to_bytes("0203ff7f0262d300");
    let (first, consumed) = DataRecord::decode_from(&buffer, 0).unwrap();
    assert_eq!(consumed, 4);
    assert_eq!(first.data_value(), &DataValue::Long(32767));

    let (second, consumed) = DataRecord::decode_from(&buffer, 4).unwrap();
    assert_eq!(consumed, 4);
    assert_eq!(second.description(), Description::TemperatureDifference);
}

proptest! {
    #[test]
    fn prop_integer_width_and_sign(value in any::<i64>(), width in prop::sample::select(vec![1usize, 2, 3, 4, 6, 8])) {
        let bits = width as u32 * 8;
        let expected = if bits == 64 { value } else { (value << (64 - bits)) >> (64 - bits) };

        let encoded = encode_int(value, width);
        prop_assert_eq!(encoded.len(), width);
        prop_assert_eq!(decode_int(&encoded).unwrap(), expected);
    }

    #[test]
    fn prop_integer_record_value(value in any::<i32>()) {
        let mut bytes = vec![0x04, 0x03];
        bytes.extend(encode_int(value as i64, 4));
        let (record, consumed) = DataRecord::decode_from(&bytes, 0).unwrap();
        prop_assert_eq!(consumed, 6);
        prop_assert_eq!(record.data_value(), &DataValue::Long(value as i64));
    }

    #[test]
    fn prop_bcd_digits(value in 0i64..100_000_000) {
        let encoded = encode_bcd(value, 4);
        prop_assert_eq!(decode_bcd(&encoded).unwrap().value(), value as i128);
    }
}
