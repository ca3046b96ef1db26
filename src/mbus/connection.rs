//! # M-Bus Master Connection
//!
//! Request/response exchange with meters over any async byte transport:
//! link reset, REQ_UD2 readout with multi-telegram continuation and
//! secondary address selection.

use crate::constants::MBUS_ADDRESS_BROADCAST_NOREPLY;
use crate::error::MBusError;
use crate::mbus::frame::{pack_frame, pack_select_frame, MBusFrame};
use crate::mbus::synchronizer::{MBusResponse, SyncConfig, TelegramSynchronizer};
use crate::util::logging::log_frame_hex;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Master side of an M-Bus line.
pub struct MBusConnection<T> {
    transport: T,
    sync: TelegramSynchronizer,
    // next frame count bit per primary address
    fcb: HashMap<u8, bool>,
}

impl<T> MBusConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: T, config: SyncConfig) -> Self {
        MBusConnection {
            transport,
            sync: TelegramSynchronizer::new(config),
            fcb: HashMap::new(),
        }
    }

    pub fn synchronizer(&self) -> &TelegramSynchronizer {
        &self.sync
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Writes one frame to the transport.
    pub async fn send_frame(&mut self, frame: &MBusFrame) -> Result<(), MBusError> {
        let data = pack_frame(frame)?;
        log_frame_hex("Request", &data);
        self.transport.write_all(&data).await?;
        self.transport.flush().await?;
        Ok(())
    }

    /// Sends SND_NKE and waits for the acknowledgement.
    ///
    /// Resets the frame count bit of `address`. Broadcasts without reply
    /// return as soon as the frame is written.
    pub async fn link_reset(&mut self, address: u8) -> Result<(), MBusError> {
        log::info!("Link reset of address {address}");
        self.sync.reset();
        self.send_frame(&MBusFrame::snd_nke(address)).await?;
        self.fcb.insert(address, true);

        if address == MBUS_ADDRESS_BROADCAST_NOREPLY {
            return Ok(());
        }
        self.sync.read_ack(&mut self.transport).await
    }

    /// Selects a meter by secondary address mask and waits for the acknowledgement.
    ///
    /// The selected meter then answers on the network layer address (253).
    pub async fn select_component(&mut self, mask: &str) -> Result<(), MBusError> {
        let mut frame = MBusFrame::ack();
        pack_select_frame(&mut frame, mask)?;
        log::info!("Selecting secondary address {mask}");

        self.sync.reset();
        self.send_frame(&frame).await?;
        self.sync.read_ack(&mut self.transport).await
    }

    /// Requests class 2 data from `address` and assembles all telegrams of the answer.
    pub async fn read(&mut self, address: u8) -> Result<MBusResponse, MBusError> {
        let request = next_request(&mut self.fcb, address);
        self.sync.reset();
        self.send_frame(&request).await?;

        let fcb = &mut self.fcb;
        let result = self
            .sync
            .read_response(&mut self.transport, || Some(next_request(fcb, address)))
            .await;

        match &result {
            Ok(response) => log::info!(
                "Read {} records in {} telegram(s) from address {}",
                response.records().len(),
                response.telegram_count,
                address
            ),
            Err(e) => log::warn!("Readout of address {address} failed: {e}"),
        }
        result
    }
}

fn next_request(fcb: &mut HashMap<u8, bool>, address: u8) -> MBusFrame {
    let bit = fcb.entry(address).or_insert(true);
    let frame = MBusFrame::req_ud2(address, *bit);
    *bit = !*bit;
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fcb_toggles_per_address() {
        let mut fcb = HashMap::new();
        assert_eq!(next_request(&mut fcb, 1).control, 0x7B);
        assert_eq!(next_request(&mut fcb, 1).control, 0x5B);
        assert_eq!(next_request(&mut fcb, 2).control, 0x7B);
        assert_eq!(next_request(&mut fcb, 1).control, 0x7B);
    }
}
