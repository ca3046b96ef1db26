//! M-Bus over TCP, for level converters with a network interface.

use crate::error::MBusError;
use crate::mbus::connection::MBusConnection;
use crate::mbus::synchronizer::SyncConfig;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a TCP stream to `addr` (`host:port`).
pub async fn connect_tcp(addr: &str) -> Result<TcpStream, MBusError> {
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| MBusError::TransportTimeout(CONNECT_TIMEOUT))?
        .map_err(|e| MBusError::TransportError(format!("{addr}: {e}")))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

impl MBusConnection<TcpStream> {
    pub async fn connect_tcp(addr: &str, config: SyncConfig) -> Result<Self, MBusError> {
        let stream = connect_tcp(addr).await?;
        log::info!("Connected to {addr}");
        Ok(MBusConnection::new(stream, config))
    }
}
