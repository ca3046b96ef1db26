//! # M-Bus Data Encoding and Decoding
//!
//! This module provides functions for encoding and decoding the value types
//! carried in M-Bus data records: little-endian integers, IEEE-754 reals,
//! BCD numbers, reversed ASCII text, compound date/time types and the packed
//! manufacturer identifier.

use crate::error::MBusError;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::Serialize;
use std::fmt;

/// Returns `len` bytes of `buffer` starting at `offset`, or a truncation error.
pub(crate) fn take_bytes(buffer: &[u8], offset: usize, len: usize) -> Result<&[u8], MBusError> {
    offset
        .checked_add(len)
        .and_then(|end| buffer.get(offset..end))
        .ok_or_else(|| MBusError::truncated(buffer, offset, len))
}

/// Returns the byte at `offset`, or a truncation error.
pub(crate) fn byte_at(buffer: &[u8], offset: usize) -> Result<u8, MBusError> {
    buffer
        .get(offset)
        .copied()
        .ok_or_else(|| MBusError::truncated(buffer, offset, 1))
}

/// Decodes a little-endian two's-complement integer of 1 to 8 bytes,
/// sign-extended to 64 bits.
pub fn decode_int(bytes: &[u8]) -> Result<i64, MBusError> {
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(MBusError::UnsupportedEncoding(format!(
            "integer width of {} bytes",
            bytes.len()
        )));
    }

    let mut raw = 0u64;
    for (i, b) in bytes.iter().enumerate() {
        raw |= (*b as u64) << (8 * i);
    }

    let shift = 64 - 8 * bytes.len() as u32;
    Ok(((raw << shift) as i64) >> shift)
}

/// Encodes an integer into `size` little-endian bytes, truncating the
/// two's-complement representation.
pub fn encode_int(value: i64, size: usize) -> Vec<u8> {
    value.to_le_bytes().iter().copied().take(size.min(8)).collect()
}

/// Decodes a little-endian IEEE-754 real of 4 or 8 bytes.
pub fn decode_real(bytes: &[u8]) -> Result<f64, MBusError> {
    match bytes.len() {
        4 => {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(bytes);
            Ok(f32::from_le_bytes(raw) as f64)
        }
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            Ok(f64::from_le_bytes(raw))
        }
        n => Err(MBusError::UnsupportedEncoding(format!("real width of {n} bytes"))),
    }
}

/// A decoded binary-coded decimal number together with its digit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Bcd {
    value: i128,
    digits: u8,
}

impl Bcd {
    pub fn new(value: i128, digits: u8) -> Self {
        Bcd { value, digits }
    }

    /// Up to 20 digits for the longest LVAR field, hence `i128`.
    pub fn value(&self) -> i128 {
        self.value
    }

    /// Number of nibbles on the wire, sign nibble included.
    pub fn digits(&self) -> usize {
        self.digits as usize
    }

    pub(crate) fn negate(self) -> Self {
        Bcd {
            value: -self.value,
            digits: self.digits,
        }
    }
}

impl fmt::Display for Bcd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value < 0 {
            let width = self.digits().saturating_sub(1);
            write!(f, "-{:0width$}", self.value.unsigned_abs())
        } else {
            write!(f, "{:0width$}", self.value, width = self.digits())
        }
    }
}

/// Decodes a little-endian BCD number.
///
/// Every nibble must be a decimal digit, except the most significant nibble
/// which may be 0xF to mark a negative value.
pub fn decode_bcd(bytes: &[u8]) -> Result<Bcd, MBusError> {
    let digits = bytes.len() * 2;
    if digits > u8::MAX as usize {
        return Err(MBusError::UnsupportedEncoding(format!("{digits}-digit BCD")));
    }

    let mut value: i128 = 0;
    let mut negative = false;

    for (i, byte) in bytes.iter().rev().enumerate() {
        let high = byte >> 4;
        let low = byte & 0x0F;

        let high = if i == 0 && high == 0x0F {
            negative = true;
            0
        } else {
            high
        };

        for nibble in [high, low] {
            if nibble > 9 {
                return Err(MBusError::UnsupportedEncoding(format!(
                    "invalid BCD digit 0x{nibble:X} in {}",
                    crate::util::hex::format_hex_compact(bytes)
                )));
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(nibble as i128))
                .ok_or_else(|| {
                    MBusError::UnsupportedEncoding(format!("{digits}-digit BCD overflows"))
                })?;
        }
    }

    Ok(Bcd::new(if negative { -value } else { value }, digits as u8))
}

/// Encodes a number into `size` little-endian BCD bytes. Negative values carry
/// 0xF in the most significant nibble.
pub fn encode_bcd(value: i64, size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size];
    let mut rest = value.unsigned_abs();

    for (i, slot) in out.iter_mut().enumerate() {
        let low = (rest % 10) as u8;
        rest /= 10;
        let high = if value < 0 && i == size - 1 {
            0x0F
        } else {
            let digit = (rest % 10) as u8;
            rest /= 10;
            digit
        };
        *slot = (high << 4) | low;
    }

    out
}

/// Decodes text transmitted last character first.
pub fn decode_text(bytes: &[u8]) -> String {
    bytes.iter().rev().map(|b| *b as char).collect()
}

/// Layout of a compound date/time field, chosen by the field width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateTimeKind {
    /// Type G, 2 bytes: date.
    Date,
    /// Type J, 3 bytes: time of day.
    Time,
    /// Type F, 4 bytes: date and time to the minute.
    DateTime,
    /// Type I, 6 bytes: date and time to the second.
    DateTimeSeconds,
}

/// Literal fields of a compound date/time value.
///
/// Reserved patterns (day 0, month 0) are kept as transmitted and flagged in
/// `invalid` together with the IV bit of the telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MBusDateTime {
    pub kind: DateTimeKind,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub invalid: bool,
    pub summer_time: bool,
}

fn two_digit_year(low_bits: u8, high_bits: u8) -> u8 {
    ((low_bits & 0xE0) >> 5) | ((high_bits & 0xF0) >> 1)
}

fn full_year(yy: u8, hundred_year: u8) -> u16 {
    if hundred_year == 0 {
        if yy <= 80 {
            2000 + yy as u16
        } else {
            1900 + yy as u16
        }
    } else {
        1900 + 100 * hundred_year as u16 + yy as u16
    }
}

impl MBusDateTime {
    /// Decodes a type G, J, F or I field, chosen by `bytes.len()`.
    pub fn decode(bytes: &[u8]) -> Result<Self, MBusError> {
        let dt = match *bytes {
            [b0, b1] => MBusDateTime {
                kind: DateTimeKind::Date,
                year: full_year(two_digit_year(b0, b1), 0),
                month: b1 & 0x0F,
                day: b0 & 0x1F,
                hour: 0,
                minute: 0,
                second: 0,
                invalid: false,
                summer_time: false,
            },
            [b0, b1, b2] => MBusDateTime {
                kind: DateTimeKind::Time,
                year: 0,
                month: 0,
                day: 0,
                hour: b2 & 0x1F,
                minute: b1 & 0x3F,
                second: b0 & 0x3F,
                invalid: false,
                summer_time: false,
            },
            [b0, b1, b2, b3] => MBusDateTime {
                kind: DateTimeKind::DateTime,
                year: full_year(two_digit_year(b2, b3), (b1 >> 5) & 0x03),
                month: b3 & 0x0F,
                day: b2 & 0x1F,
                hour: b1 & 0x1F,
                minute: b0 & 0x3F,
                second: 0,
                invalid: b0 & 0x80 != 0,
                summer_time: b1 & 0x80 != 0,
            },
            [b0, b1, b2, b3, b4, _] => MBusDateTime {
                kind: DateTimeKind::DateTimeSeconds,
                year: full_year(two_digit_year(b3, b4), 0),
                month: b4 & 0x0F,
                day: b3 & 0x1F,
                hour: b2 & 0x1F,
                minute: b1 & 0x3F,
                second: b0 & 0x3F,
                invalid: b0 & 0x80 != 0,
                summer_time: b1 & 0x80 != 0,
            },
            _ => {
                return Err(MBusError::UnsupportedEncoding(format!(
                    "date/time width of {} bytes",
                    bytes.len()
                )))
            }
        };

        Ok(dt.flag_reserved())
    }

    fn flag_reserved(mut self) -> Self {
        if self.kind != DateTimeKind::Time && (self.day == 0 || self.month == 0 || self.month > 12)
        {
            self.invalid = true;
        }
        self
    }

    /// Calendar date, if the fields form one.
    pub fn date(&self) -> Option<NaiveDate> {
        match self.kind {
            DateTimeKind::Time => None,
            _ => NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32),
        }
    }

    pub fn time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
    }

    /// Local date and time, if the fields form one. Type G yields midnight,
    /// type J never converts.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        Some(self.date()?.and_time(self.time()?))
    }

    /// Milliseconds since the Unix epoch, interpreting the fields in `offset`.
    pub fn timestamp_millis(&self, offset: FixedOffset) -> Option<i64> {
        offset
            .from_local_datetime(&self.to_naive()?)
            .single()
            .map(|dt| dt.timestamp_millis())
    }
}

impl fmt::Display for MBusDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DateTimeKind::Date => {
                write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)?
            }
            DateTimeKind::Time => {
                write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)?
            }
            _ => write!(
                f,
                "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
                self.year, self.month, self.day, self.hour, self.minute, self.second
            )?,
        }
        if self.invalid {
            f.write_str(" (invalid)")?;
        }
        Ok(())
    }
}

/// Encodes a three-letter manufacturer code into its packed 2-byte form
/// (high byte first).
pub fn mbus_data_manufacturer_encode(manufacturer: &str) -> Result<[u8; 2], MBusError> {
    let letters = manufacturer.as_bytes();
    if letters.len() != 3 || !letters.iter().all(|c| c.is_ascii_uppercase()) {
        return Err(MBusError::UnsupportedEncoding(format!(
            "manufacturer code '{manufacturer}'"
        )));
    }

    let id = letters
        .iter()
        .fold(0u16, |acc, c| (acc << 5) | ((*c - 64) as u16 & 0x1F));

    Ok([(id >> 8) as u8, (id & 0xFF) as u8])
}

/// Decodes the manufacturer ID from the 2-byte encoded data.
pub fn mbus_decode_manufacturer(byte1: u8, byte2: u8) -> String {
    let mut id = ((byte1 as u32) << 8) + (byte2 as u32);
    let mut manufacturer = String::with_capacity(3);

    manufacturer.push(char::from_u32(((id / (32 * 32)) & 0x1F) + 64).unwrap_or('?'));
    id %= 32 * 32;
    manufacturer.push(char::from_u32((id / 32) + 64).unwrap_or('?'));
    id %= 32;
    manufacturer.push(char::from_u32(id + 64).unwrap_or('?'));

    manufacturer
}
