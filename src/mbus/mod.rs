//! The mbus module contains the link layer: frame parsing and packing, telegram
//! synchronization over a byte stream and the master connection with its
//! serial and TCP transports.

pub mod connection;
pub mod frame;
pub mod serial;
pub mod serial_mock;
pub mod synchronizer;
pub mod tcp;

pub use connection::MBusConnection;
pub use frame::*;
pub use serial::{open_serial, timeout_for_baudrate, SerialConfig};
pub use synchronizer::{MBusResponse, SyncConfig, SyncState, TelegramSynchronizer};
pub use tcp::connect_tcp;
