//! # M-Bus Serial Communication
//!
//! Opens a serial port with the M-Bus line settings (8 data bits, even parity,
//! one stop bit) and derives the read timeout from the baud rate.

use crate::error::MBusError;
use crate::mbus::connection::MBusConnection;
use crate::mbus::synchronizer::SyncConfig;
use std::time::Duration;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Configuration for serial connection.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baudrate: u32,
    /// Read timeout; `None` uses [`timeout_for_baudrate`].
    pub timeout: Option<Duration>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig::for_baudrate(2400)
    }
}

impl SerialConfig {
    pub fn for_baudrate(baudrate: u32) -> Self {
        SerialConfig {
            baudrate,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn read_timeout(&self) -> Duration {
        self.timeout.unwrap_or_else(|| timeout_for_baudrate(self.baudrate))
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default().with_read_timeout(self.read_timeout())
    }
}

/// Maps a baud rate to a coarse read timeout.
pub fn timeout_for_baudrate(baudrate: u32) -> Duration {
    match baudrate {
        300 => Duration::from_millis(1300),
        600 => Duration::from_millis(800),
        1200 => Duration::from_millis(500),
        2400 | 4800 => Duration::from_millis(300),
        9600 | 19200 | 38400 => Duration::from_millis(200),
        _ => Duration::from_millis(500),
    }
}

/// Opens `port_name` with the M-Bus line settings.
pub fn open_serial(port_name: &str, config: &SerialConfig) -> Result<SerialStream, MBusError> {
    tokio_serial::new(port_name, config.baudrate)
        .data_bits(tokio_serial::DataBits::Eight)
        .stop_bits(tokio_serial::StopBits::One)
        .parity(tokio_serial::Parity::Even)
        .timeout(config.read_timeout())
        .open_native_async()
        .map_err(|e| MBusError::TransportError(format!("{port_name}: {e}")))
}

impl MBusConnection<SerialStream> {
    /// Establishes a connection to the serial port using the provided port name.
    pub fn connect_serial(port_name: &str, config: SerialConfig) -> Result<Self, MBusError> {
        let port = open_serial(port_name, &config)?;
        log::info!("Opened {} at {} baud", port_name, config.baudrate);
        Ok(MBusConnection::new(port, config.sync_config()))
    }
}
