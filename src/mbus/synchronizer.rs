//! # Telegram Stream Synchronizer
//!
//! Locates long frames in a byte stream that may contain noise (echo bytes or
//! stray characters on the half-duplex bus) and assembles the telegrams of one
//! response, following the "more records follow" continuation flag.
//!
//! Frame extraction ([`TelegramSynchronizer::poll_frame`]) is pure and works on
//! bytes pushed into the internal buffer; [`TelegramSynchronizer::read_response`]
//! drives it from an async transport with a read timeout.

use crate::constants::{MBUS_FRAME_ACK, MBUS_FRAME_LONG_OVERHEAD, MBUS_FRAME_LONG_START};
use crate::error::MBusError;
use crate::mbus::frame::{pack_frame, MBusFrame, MBusMessage};
use crate::payload::variable_data::VariableDataStructure;
use crate::payload::record::DataRecord;
use crate::util::logging::{log_frame_hex, log_noise};
use bytes::{Buf, BytesMut};
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Bytes requested from the transport per read.
const READ_CHUNK: usize = 256;

/// Limits applied while reading one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Longest wait for the next chunk of bytes.
    pub read_timeout: Duration,
    /// Telegrams accepted for one response.
    pub max_telegrams: usize,
    /// Noise bytes tolerated before a frame start.
    pub max_noise_bytes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            read_timeout: Duration::from_millis(500),
            max_telegrams: 16,
            max_noise_bytes: 1024,
        }
    }
}

impl SyncConfig {
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_max_telegrams(mut self, max_telegrams: usize) -> Self {
        self.max_telegrams = max_telegrams;
        self
    }

    pub fn with_max_noise_bytes(mut self, max_noise_bytes: usize) -> Self {
        self.max_noise_bytes = max_noise_bytes;
        self
    }
}

/// States of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Scanning for `68 L L 68`.
    SeekStart,
    /// A valid frame header was found; waiting for `length` bytes.
    ReadFrame { length: usize },
    /// The last telegram announced more records; the next one must be requested.
    AwaitContinuation,
    Done,
    Error,
}

/// One logical response, assembled from one or more telegrams.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MBusResponse {
    pub address_field: u8,
    pub control_field: u8,
    pub telegram_count: usize,
    pub data: VariableDataStructure,
}

impl MBusResponse {
    pub fn records(&self) -> &[DataRecord] {
        self.data.records()
    }
}

/// Frame synchronizer over a byte buffer.
#[derive(Debug)]
pub struct TelegramSynchronizer {
    config: SyncConfig,
    buffer: BytesMut,
    state: SyncState,
    noise: usize,
    total_noise: usize,
    partial: Option<MBusResponse>,
}

impl TelegramSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        TelegramSynchronizer {
            config,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            state: SyncState::SeekStart,
            noise: 0,
            total_noise: 0,
            partial: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Noise bytes discarded since the last reset.
    pub fn discarded_bytes(&self) -> usize {
        self.total_noise
    }

    /// Bytes buffered but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Records assembled before the last failure, including the records of
    /// a telegram whose data block failed part way.
    pub fn partial_response(&self) -> Option<&MBusResponse> {
        self.partial.as_ref()
    }

    /// Drops buffered bytes and returns to `SeekStart`.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = SyncState::SeekStart;
        self.noise = 0;
        self.total_noise = 0;
        self.partial = None;
    }

    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn discard(&mut self, count: usize) -> Result<(), MBusError> {
        if count == 0 {
            return Ok(());
        }
        log_noise(count, &self.buffer[..count]);
        self.buffer.advance(count);
        self.noise += count;
        self.total_noise += count;

        if self.noise > self.config.max_noise_bytes {
            self.state = SyncState::Error;
            return Err(MBusError::ProtocolLimitExceeded(format!(
                "{} noise bytes without a frame start",
                self.noise
            )));
        }
        Ok(())
    }

    /// Extracts the next long frame from the buffered bytes.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Bytes before a valid
    /// `68 L L 68` header are discarded as noise.
    pub fn poll_frame(&mut self) -> Result<Option<MBusMessage>, MBusError> {
        loop {
            match self.state {
                SyncState::SeekStart => {
                    let Some(start) = self.buffer.iter().position(|b| *b == MBUS_FRAME_LONG_START)
                    else {
                        self.discard(self.buffer.len())?;
                        return Ok(None);
                    };
                    self.discard(start)?;

                    if self.buffer.len() < 4 {
                        return Ok(None);
                    }
                    let length = self.buffer[1];
                    if self.buffer[2] == length && self.buffer[3] == MBUS_FRAME_LONG_START && length >= 3
                    {
                        self.state = SyncState::ReadFrame {
                            length: length as usize + MBUS_FRAME_LONG_OVERHEAD,
                        };
                    } else {
                        self.discard(1)?;
                    }
                }
                SyncState::ReadFrame { length } => {
                    if self.buffer.len() < length {
                        return Ok(None);
                    }
                    let frame = self.buffer.split_to(length);
                    log_frame_hex("Telegram", &frame);
                    self.noise = 0;

                    return match MBusMessage::decode(&frame, length) {
                        Ok(message) => {
                            self.state = SyncState::SeekStart;
                            Ok(Some(message))
                        }
                        Err(e) => {
                            self.state = SyncState::Error;
                            Err(e)
                        }
                    };
                }
                SyncState::AwaitContinuation | SyncState::Done | SyncState::Error => {
                    return Ok(None)
                }
            }
        }
    }

    /// Reads one chunk from `source` into the buffer.
    pub async fn fill<R>(&mut self, source: &mut R) -> Result<usize, MBusError>
    where
        R: AsyncRead + Unpin,
    {
        self.buffer.reserve(READ_CHUNK);
        let read = timeout(self.config.read_timeout, source.read_buf(&mut self.buffer)).await;

        match read {
            Err(_) => Err(MBusError::TransportTimeout(self.config.read_timeout)),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(0)) => Err(MBusError::TransportClosed),
            Ok(Ok(n)) => Ok(n),
        }
    }

    /// Waits for a single character acknowledgement, skipping noise.
    pub async fn read_ack<R>(&mut self, source: &mut R) -> Result<(), MBusError>
    where
        R: AsyncRead + Unpin,
    {
        self.noise = 0;
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == MBUS_FRAME_ACK) {
                self.discard(pos)?;
                self.buffer.advance(1);
                return Ok(());
            }
            let pending = self.buffer.len();
            self.discard(pending)?;
            self.fill(source).await?;
        }
    }

    /// Reads one response, requesting continuation telegrams while the data
    /// block announces more records.
    ///
    /// `next_request` produces the frame sent for each continuation; `None`
    /// means the meter sends on its own and the synchronizer only listens.
    pub async fn read_response<T, F>(
        &mut self,
        transport: &mut T,
        mut next_request: F,
    ) -> Result<MBusResponse, MBusError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
        F: FnMut() -> Option<MBusFrame>,
    {
        self.state = SyncState::SeekStart;
        self.noise = 0;
        self.partial = None;
        let mut response: Option<MBusResponse> = None;

        loop {
            match self.state {
                SyncState::SeekStart | SyncState::ReadFrame { .. } => {
                    let message = match self.poll_frame() {
                        Ok(Some(message)) => message,
                        Ok(None) => {
                            if let Err(e) = self.fill(transport).await {
                                return Err(self.fail(e, response));
                            }
                            continue;
                        }
                        Err(e) => return Err(self.fail(e, response)),
                    };

                    let mut data = VariableDataStructure::new();
                    let decoded = message.decode_variable_data(&mut data);
                    let more = data.more_records_follow();

                    let assembled = match response.take() {
                        Some(mut r) => {
                            r.telegram_count += 1;
                            r.data.append(data);
                            r
                        }
                        None => MBusResponse {
                            address_field: message.address_field(),
                            control_field: message.control_field(),
                            telegram_count: 1,
                            data,
                        },
                    };
                    log::debug!(
                        "Telegram {} from address {}: {} records so far",
                        assembled.telegram_count,
                        assembled.address_field,
                        assembled.records().len()
                    );

                    if let Err(e) = decoded {
                        return Err(self.fail(e, Some(assembled)));
                    }

                    if !more {
                        self.state = SyncState::Done;
                    } else if assembled.telegram_count >= self.config.max_telegrams {
                        let e = MBusError::ProtocolLimitExceeded(format!(
                            "more records follow after {} telegrams",
                            assembled.telegram_count
                        ));
                        return Err(self.fail(e, Some(assembled)));
                    } else {
                        self.state = SyncState::AwaitContinuation;
                    }
                    response = Some(assembled);
                }
                SyncState::AwaitContinuation => {
                    if let Some(frame) = next_request() {
                        log::debug!("Requesting continuation telegram");
                        let bytes = match pack_frame(&frame) {
                            Ok(bytes) => bytes,
                            Err(e) => return Err(self.fail(e, response)),
                        };
                        log_frame_hex("Request", &bytes);
                        let sent = async {
                            transport.write_all(&bytes).await?;
                            transport.flush().await
                        }
                        .await;
                        if let Err(e) = sent {
                            return Err(self.fail(e.into(), response));
                        }
                    }
                    self.state = SyncState::SeekStart;
                }
                SyncState::Done => {
                    return response.ok_or_else(|| {
                        MBusError::FrameParseError("no telegram received".to_string())
                    });
                }
                SyncState::Error => {
                    return Err(MBusError::FrameParseError(
                        "synchronizer is in the error state".to_string(),
                    ));
                }
            }
        }
    }

    fn fail(&mut self, error: MBusError, partial: Option<MBusResponse>) -> MBusError {
        self.state = SyncState::Error;
        self.partial = partial;
        error
    }
}

impl Default for TelegramSynchronizer {
    fn default() -> Self {
        TelegramSynchronizer::new(SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex::hex_to_bytes;

    const BUSY: &str = "68040468080170088116";

    #[test]
    fn test_poll_frame_needs_more_bytes() {
        let mut sync = TelegramSynchronizer::default();
        let bytes = hex_to_bytes(BUSY);

        sync.push_bytes(&bytes[..3]);
        assert!(sync.poll_frame().unwrap().is_none());
        assert_eq!(sync.state(), SyncState::SeekStart);

        sync.push_bytes(&bytes[3..6]);
        assert!(sync.poll_frame().unwrap().is_none());
        assert_eq!(sync.state(), SyncState::ReadFrame { length: 10 });

        sync.push_bytes(&bytes[6..]);
        let message = sync.poll_frame().unwrap().unwrap();
        assert_eq!(message.control_information(), 0x70);
        assert!(sync.buffered().is_empty());
    }

    #[test]
    fn test_poll_frame_skips_noise() {
        let mut sync = TelegramSynchronizer::default();
        sync.push_bytes(&[0x01, 0x03, 0x03, 0x07]);
        sync.push_bytes(&hex_to_bytes(BUSY));

        let message = sync.poll_frame().unwrap().unwrap();
        assert_eq!(message.address_field(), 0x01);
        assert_eq!(sync.discarded_bytes(), 4);
    }

    #[test]
    fn test_false_start_is_skipped() {
        let mut sync = TelegramSynchronizer::default();
        // 0x68 followed by disagreeing length bytes
        sync.push_bytes(&[0x68, 0x05, 0x06, 0x68]);
        sync.push_bytes(&hex_to_bytes(BUSY));

        assert!(sync.poll_frame().unwrap().is_some());
        assert_eq!(sync.discarded_bytes(), 4);
    }

    #[test]
    fn test_noise_limit() {
        let mut sync = TelegramSynchronizer::new(SyncConfig::default().with_max_noise_bytes(8));
        sync.push_bytes(&[0x00; 9]);
        assert!(matches!(
            sync.poll_frame(),
            Err(MBusError::ProtocolLimitExceeded(_))
        ));
        assert_eq!(sync.state(), SyncState::Error);
    }

    #[test]
    fn test_corrupt_frame_enters_error_state() {
        let mut sync = TelegramSynchronizer::default();
        let mut bytes = hex_to_bytes(BUSY);
        bytes[8] ^= 0xFF;
        sync.push_bytes(&bytes);
        assert!(matches!(
            sync.poll_frame(),
            Err(MBusError::ChecksumMismatch { .. })
        ));
        assert_eq!(sync.state(), SyncState::Error);

        sync.reset();
        assert_eq!(sync.state(), SyncState::SeekStart);
        assert!(sync.buffered().is_empty());
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut sync = TelegramSynchronizer::default();
        let bytes = hex_to_bytes(BUSY);
        sync.push_bytes(&bytes);
        sync.push_bytes(&bytes);
        assert!(sync.poll_frame().unwrap().is_some());
        assert!(sync.poll_frame().unwrap().is_some());
        assert!(sync.poll_frame().unwrap().is_none());
    }

    #[test]
    fn test_config_builders() {
        let config = SyncConfig::default()
            .with_read_timeout(Duration::from_millis(50))
            .with_max_telegrams(2);
        assert_eq!(config.read_timeout, Duration::from_millis(50));
        assert_eq!(config.max_telegrams, 2);
        assert_eq!(config.max_noise_bytes, 1024);
    }
}
