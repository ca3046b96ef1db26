//! # Utility Modules
//!
//! Hex encoding/decoding and frame logging helpers shared by the crate.

pub mod hex;
pub mod logging;

pub use self::hex::{decode_hex, encode_hex, format_hex_compact, parse_hex_lenient, pretty_hex};
pub use self::logging::log_frame_hex;
