//! # Hex Encoding/Decoding Utilities
//!
//! Hex helpers used for telegram input on the command line, `Display`
//! implementations and frame logging.
//!
//! ```rust
//! use mbus_decode::util::hex::{decode_hex, encode_hex, format_hex_compact};
//!
//! let data = [0x68, 0x31, 0x31, 0x68];
//! assert_eq!(encode_hex(&data), "68313168");
//! assert_eq!(decode_hex("68 31 31 68").unwrap(), data);
//! assert_eq!(format_hex_compact(&data), "68 31 31 68");
//! ```

use crate::error::MBusError;
use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

impl From<HexError> for MBusError {
    fn from(_: HexError) -> Self {
        MBusError::InvalidHexString
    }
}

/// Encode bytes to lowercase hex string
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Encode bytes to uppercase hex string
pub fn encode_hex_upper(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Decode hex string to bytes
///
/// Accepts both uppercase and lowercase hex characters.
/// Whitespace is automatically stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Parse hex that may contain separators such as `:` or `-`.
pub fn parse_hex_lenient(input: &str) -> Result<Vec<u8>, HexError> {
    let hex_chars: String = input.chars().filter(|c| c.is_ascii_hexdigit()).collect();

    if hex_chars.is_empty() {
        return Err(HexError::EmptyString);
    }
    if hex_chars.len() % 2 != 0 {
        return Err(HexError::OddLength(hex_chars.len()));
    }

    hex::decode(&hex_chars).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Format hex data for compact display, e.g. "68 31 31 68".
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex dump with offsets and an ASCII column, for telegram analysis.
pub fn pretty_hex(data: &[u8], bytes_per_line: usize) -> String {
    let width = bytes_per_line.max(1);

    data.chunks(width)
        .enumerate()
        .map(|(i, chunk)| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!(
                "{:04x}: {:<pad$} |{}|",
                i * width,
                hex.join(" "),
                ascii,
                pad = width * 3 - 1
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decodes test data, panicking on invalid hex.
#[cfg(test)]
pub(crate) fn hex_to_bytes(hex: &str) -> Vec<u8> {
    decode_hex(hex).expect("Invalid hex in test data")
}
