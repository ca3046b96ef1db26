//! # mbus-decode - M-Bus (Meter-Bus) Telegram Decoding
//!
//! The mbus-decode crate decodes wired M-Bus (EN 13757-2/-3) telegrams, the
//! European standard for reading utility meters such as electricity, gas,
//! water and heat meters.
//!
//! ## Features
//!
//! - Parse and pack M-Bus frames (ACK, short, control and long frames) with checksum validation
//! - Decode the variable data structure: fixed data header, data records and manufacturer data
//! - Resolve DIF/VIF codes to descriptions, DLMS units and decimal exponents
//! - Decode integer, real, BCD, string and date/time (types F/G/I/J) values
//! - Synchronize on telegrams in a noisy byte stream and follow multi-telegram responses
//! - Talk to meters over serial or TCP via tokio
//!
//! ## Usage
//!
//! ```rust
//! use mbus_decode::{MBusMessage, VariableDataStructure};
//!
//! let telegram = hex::decode("68040468080170088116").unwrap();
//! let message = MBusMessage::decode(&telegram, telegram.len()).unwrap();
//! let data = message.variable_data_structure().unwrap();
//! assert_eq!(data.application_error(), Some(0x08));
//! ```

pub mod constants;
pub mod error;
pub mod logging;
pub mod mbus;
pub mod payload;
pub mod util;

pub use crate::error::{ErrorCategory, MBusError};
pub use crate::logging::{init_logger, log_debug, log_error, log_info, log_warn};

// Link layer
pub use mbus::{
    connect_tcp, open_serial, MBusConnection, MBusFrame, MBusFrameType, MBusMessage,
    MBusResponse, SerialConfig, SyncConfig, SyncState, TelegramSynchronizer,
};

// Application layer
pub use payload::{
    DataHeader, DataRecord, DataValue, DataValueType, Description, DeviceType, DlmsUnit,
    FunctionField, MBusDateTime, SecondaryAddress, StatusFlags, ValueInformation,
    VariableDataStructure, VifModifier,
};

/// Decodes one complete long frame into its variable data structure.
///
/// Records decoded before a failure are lost here; use
/// [`MBusMessage::decode_variable_data`] to keep them.
pub fn decode_telegram(buffer: &[u8]) -> Result<VariableDataStructure, MBusError> {
    let message = MBusMessage::decode(buffer, buffer.len())?;
    message.variable_data_structure()
}
