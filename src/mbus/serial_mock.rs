//! Mock serial port implementation for testing
//!
//! This module provides a mock serial port that behaves like a half-duplex
//! M-Bus line: bytes queued with [`MockSerialPort::queue_rx_data`] are readable
//! immediately, responses queued with [`MockSerialPort::queue_response`] become
//! readable after the next write. A read on an empty, open port stays pending,
//! so the caller's read timeout fires like it would on real hardware.

use crate::error::MBusError;
use crate::mbus::frame::{pack_frame, MBusFrame};
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[derive(Default)]
struct MockState {
    tx: Vec<u8>,
    rx: VecDeque<u8>,
    responses: VecDeque<Vec<u8>>,
    next_error: Option<io::Error>,
    closed: bool,
    waker: Option<Waker>,
}

/// Mock serial port that simulates bidirectional communication
#[derive(Clone, Default)]
pub struct MockSerialPort {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialPort {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue data to be read from the port
    pub fn queue_rx_data(&self, data: &[u8]) {
        let mut state = self.lock();
        state.rx.extend(data);
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    /// Queue bytes the "meter" sends after the next request written to the port
    pub fn queue_response(&self, data: &[u8]) {
        self.lock().responses.push_back(data.to_vec());
    }

    /// Queue a frame the "meter" sends after the next request
    pub fn queue_frame_response(&self, frame: &MBusFrame) -> Result<(), MBusError> {
        self.queue_response(&pack_frame(frame)?);
        Ok(())
    }

    /// Get data that was written to the port
    pub fn get_tx_data(&self) -> Vec<u8> {
        self.lock().tx.clone()
    }

    /// Clear all buffers
    pub fn clear(&self) {
        let mut state = self.lock();
        state.tx.clear();
        state.rx.clear();
        state.responses.clear();
    }

    /// Set an error to be returned on the next operation
    pub fn set_next_error(&self, error: io::Error) {
        self.lock().next_error = Some(error);
    }

    /// Simulate the peer hanging up; reads return end of stream once drained
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }
}

impl AsyncRead for MockSerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.lock();

        if let Some(error) = state.next_error.take() {
            return Poll::Ready(Err(error));
        }

        if state.rx.is_empty() {
            if state.closed {
                return Poll::Ready(Ok(()));
            }
            state.waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let available = state.rx.len().min(buf.remaining());
        let chunk: Vec<u8> = state.rx.drain(..available).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.lock();

        if let Some(error) = state.next_error.take() {
            return Poll::Ready(Err(error));
        }
        if state.closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock port closed",
            )));
        }

        state.tx.extend_from_slice(buf);
        if let Some(response) = state.responses.pop_front() {
            state.rx.extend(response);
            if let Some(waker) = state.waker.take() {
                waker.wake();
            }
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.lock().closed = true;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_response_released_on_write() {
        let mut port = MockSerialPort::new();
        port.queue_frame_response(&MBusFrame::ack()).unwrap();

        port.write_all(&[0x10, 0x40, 0x01, 0x41, 0x16]).await.unwrap();
        let mut buf = [0u8; 4];
        let n = port.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0xE5]);
        assert_eq!(port.get_tx_data(), vec![0x10, 0x40, 0x01, 0x41, 0x16]);
    }

    #[tokio::test]
    async fn test_closed_port_reads_eof() {
        let mut port = MockSerialPort::new();
        port.queue_rx_data(&[0x01]);
        port.close();

        let mut buf = [0u8; 4];
        assert_eq!(port.read(&mut buf).await.unwrap(), 1);
        assert_eq!(port.read(&mut buf).await.unwrap(), 0);
        assert!(port.write_all(&[0x00]).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_error() {
        let mut port = MockSerialPort::new();
        port.set_next_error(io::Error::new(io::ErrorKind::Other, "line fault"));
        let mut buf = [0u8; 4];
        assert!(port.read(&mut buf).await.is_err());
    }
}
