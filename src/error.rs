//! # M-Bus Error Handling
//!
//! This module defines the MBusError enum, which represents the different error
//! types that can occur while decoding M-Bus telegrams or talking to a meter.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Represents the different error types that can occur in the M-Bus crate.
#[derive(Debug, Error)]
pub enum MBusError {
    /// A DIF/VIF header byte encodes a reserved or unsupported combination.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// The buffer ends before the length declared by a header.
    #[error("Truncated buffer: {needed} bytes needed at offset {offset}, {available} available")]
    TruncatedBuffer {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The frame or its fixed data header ends before its declared length.
    #[error("Truncated frame: {needed} bytes needed, {available} available")]
    TruncatedFrame { needed: usize, available: usize },

    /// Indicates a checksum mismatch.
    #[error("Invalid checksum: expected 0x{expected:02X}, calculated 0x{calculated:02X}")]
    ChecksumMismatch { expected: u8, calculated: u8 },

    /// A value encoding that cannot be decoded (reserved LVAR selector, bad BCD digit, unknown CI).
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// A configured protocol bound was exceeded (telegram count, noise bytes).
    #[error("Protocol limit exceeded: {0}")]
    ProtocolLimitExceeded(String),

    /// Indicates an error when parsing an M-Bus frame envelope.
    #[error("Error parsing M-Bus frame: {0}")]
    FrameParseError(String),

    /// The byte source did not deliver data within the configured timeout.
    #[error("Transport timeout after {0:?}")]
    TransportTimeout(Duration),

    /// The byte source was closed by the peer or the caller.
    #[error("Transport closed")]
    TransportClosed,

    /// Any other transport failure.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Indicates an invalid hexadecimal string was provided.
    #[error("Invalid hexadecimal string")]
    InvalidHexString,
}

/// Coarse classification of an [`MBusError`], telling the caller what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The frame is corrupt; discard it and resynchronize.
    CorruptFrame,
    /// A single field could not be decoded; surrounding records are usable.
    UnsupportedField,
    /// A protocol bound was hit.
    ProtocolLimit,
    /// The transport is gone or not answering.
    Transport,
}

impl MBusError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MBusError::ChecksumMismatch { .. }
            | MBusError::TruncatedFrame { .. }
            | MBusError::FrameParseError(_)
            | MBusError::InvalidHexString => ErrorCategory::CorruptFrame,
            MBusError::MalformedHeader(_)
            | MBusError::TruncatedBuffer { .. }
            | MBusError::UnsupportedEncoding(_) => ErrorCategory::UnsupportedField,
            MBusError::ProtocolLimitExceeded(_) => ErrorCategory::ProtocolLimit,
            MBusError::TransportTimeout(_)
            | MBusError::TransportClosed
            | MBusError::TransportError(_) => ErrorCategory::Transport,
        }
    }

    /// Builds a [`MBusError::TruncatedBuffer`] for a read of `needed` bytes at `offset`.
    pub(crate) fn truncated(buffer: &[u8], offset: usize, needed: usize) -> Self {
        MBusError::TruncatedBuffer {
            offset,
            needed,
            available: buffer.len().saturating_sub(offset),
        }
    }

    /// Builds a [`MBusError::TruncatedFrame`] for a frame of `needed` bytes.
    pub(crate) fn truncated_frame(buffer: &[u8], needed: usize) -> Self {
        MBusError::TruncatedFrame {
            needed,
            available: buffer.len(),
        }
    }
}

impl From<io::Error> for MBusError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected => MBusError::TransportClosed,
            io::ErrorKind::TimedOut => MBusError::TransportTimeout(Duration::ZERO),
            _ => MBusError::TransportError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let closed: MBusError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(closed, MBusError::TransportClosed));

        let other: MBusError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(other, MBusError::TransportError(ref m) if m == "denied"));
    }

    #[test]
    fn test_truncated_frame_is_corrupt() {
        let err = MBusError::truncated_frame(&[0x68, 0x04], 10);
        assert!(matches!(err, MBusError::TruncatedFrame { needed: 10, available: 2 }));
        assert_eq!(err.category(), ErrorCategory::CorruptFrame);
    }

    #[test]
    fn test_truncated_helper() {
        let err = MBusError::truncated(&[0x01, 0x02, 0x03], 2, 4);
        assert!(matches!(
            err,
            MBusError::TruncatedBuffer { offset: 2, needed: 4, available: 1 }
        ));
    }
}
