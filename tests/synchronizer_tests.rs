mod common;

use common::*;
use mbus_decode::mbus::frame::{pack_frame, MBusFrame};
use mbus_decode::mbus::serial_mock::MockSerialPort;
use mbus_decode::{
    DataValue, ErrorCategory, MBusError, SyncConfig, SyncState, TelegramSynchronizer,
};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_test::io::Builder;

const GARBAGE: [u8; 4] = [0x01, 0x03, 0x03, 0x07];

fn quick() -> SyncConfig {
    SyncConfig::default().with_read_timeout(Duration::from_millis(50))
}

#[tokio::test]
async fn test_garbage_after_telegram() {
    let mut stream = hex_to_bytes(EXAMPLE_DATA_01_HEX);
    stream.extend_from_slice(&GARBAGE);
    let mut transport = Builder::new().read(&stream).build();

    let mut sync = TelegramSynchronizer::new(quick());
    let response = sync.read_response(&mut transport, || None).await.unwrap();

    assert_eq!(response.address_field, 0x01);
    assert_eq!(response.telegram_count, 1);
    assert_eq!(response.records().len(), 6);
    assert_eq!(sync.state(), SyncState::Done);
}

#[tokio::test]
async fn test_garbage_before_telegram() {
    let clean = hex_to_bytes(EXAMPLE_DATA_01_HEX);
    let mut stream = GARBAGE.to_vec();
    stream.extend(&clean);

    let mut sync = TelegramSynchronizer::new(quick());
    let mut transport = Builder::new().read(&clean).build();
    let expected = sync.read_response(&mut transport, || None).await.unwrap();
    assert_eq!(sync.discarded_bytes(), 0);

    sync.reset();
    let mut transport = Builder::new().read(&stream).build();
    let response = sync.read_response(&mut transport, || None).await.unwrap();

    assert_eq!(response, expected);
    assert_eq!(response.records().len(), 6);
    assert_eq!(sync.discarded_bytes(), GARBAGE.len());
}

#[tokio::test]
async fn test_telegram_split_across_reads() {
    let bytes = hex_to_bytes(EDC_HEX);
    let mut transport = Builder::new()
        .read(&bytes[..2])
        .read(&bytes[2..40])
        .read(&bytes[40..])
        .build();

    let mut sync = TelegramSynchronizer::new(quick());
    let response = sync.read_response(&mut transport, || None).await.unwrap();
    assert_eq!(response.records().len(), 21);
}

#[tokio::test]
async fn test_timeout_when_source_is_silent() {
    let (mut client, _server) = tokio::io::duplex(64);

    let mut sync = TelegramSynchronizer::new(quick());
    let err = sync.read_response(&mut client, || None).await.unwrap_err();

    assert!(matches!(err, MBusError::TransportTimeout(d) if d == Duration::from_millis(50)));
    assert_eq!(err.category(), ErrorCategory::Transport);
    assert_eq!(sync.state(), SyncState::Error);
}

#[tokio::test]
async fn test_timeout_mid_frame() {
    let (mut client, mut server) = tokio::io::duplex(256);
    let bytes = hex_to_bytes(EXAMPLE_DATA_01_HEX);
    server.write_all(&bytes[..20]).await.unwrap();

    let mut sync = TelegramSynchronizer::new(quick());
    let err = sync.read_response(&mut client, || None).await.unwrap_err();
    assert!(matches!(err, MBusError::TransportTimeout(_)));
}

#[tokio::test]
async fn test_closed_source() {
    let (mut client, server) = tokio::io::duplex(64);
    drop(server);

    let mut sync = TelegramSynchronizer::new(quick());
    let err = sync.read_response(&mut client, || None).await.unwrap_err();
    assert!(matches!(err, MBusError::TransportClosed));
}

#[tokio::test]
async fn test_multi_telegram_response() {
    let port = MockSerialPort::new();
    port.queue_rx_data(&first_of_two(0x01));
    port.queue_response(&second_of_two(0x01));

    let mut transport = port.clone();
    let mut sync = TelegramSynchronizer::new(quick());
    let response = sync
        .read_response(&mut transport, || Some(MBusFrame::req_ud2(0x01, false)))
        .await
        .unwrap();

    assert_eq!(response.telegram_count, 2);
    assert!(!response.data.more_records_follow());
    let records = response.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].data_value(), &DataValue::Long(1));
    assert_eq!(records[1].data_value(), &DataValue::Long(2));

    assert_eq!(
        port.get_tx_data(),
        pack_frame(&MBusFrame::req_ud2(0x01, false)).unwrap()
    );
}

#[tokio::test]
async fn test_listen_only_continuation() {
    let mut stream = first_of_two(0x05);
    stream.extend(second_of_two(0x05));
    let mut transport = Builder::new().read(&stream).build();

    let mut sync = TelegramSynchronizer::new(quick());
    let response = sync.read_response(&mut transport, || None).await.unwrap();
    assert_eq!(response.address_field, 0x05);
    assert_eq!(response.telegram_count, 2);
}

#[tokio::test]
async fn test_telegram_limit() {
    let mut stream = first_of_two(0x01);
    stream.extend(first_of_two(0x01));
    let mut transport = Builder::new().read(&stream).build();

    let mut sync = TelegramSynchronizer::new(quick().with_max_telegrams(2));
    let err = sync.read_response(&mut transport, || None).await.unwrap_err();

    assert!(matches!(err, MBusError::ProtocolLimitExceeded(_)));
    assert_eq!(err.category(), ErrorCategory::ProtocolLimit);
    let partial = sync.partial_response().unwrap();
    assert_eq!(partial.telegram_count, 2);
    assert_eq!(partial.records().len(), 2);
}

#[tokio::test]
async fn test_noise_limit() {
    let noise = vec![0x00; 40];
    let mut transport = Builder::new().read(&noise).build();

    let mut sync = TelegramSynchronizer::new(quick().with_max_noise_bytes(32));
    let err = sync.read_response(&mut transport, || None).await.unwrap_err();
    assert!(matches!(err, MBusError::ProtocolLimitExceeded(_)));
}

#[tokio::test]
async fn test_corrupt_frame_is_rejected_whole() {
    let mut bytes = hex_to_bytes(EXAMPLE_DATA_01_HEX);
    let checksum_at = bytes.len() - 2;
    bytes[checksum_at] ^= 0x01;
    let mut transport = Builder::new().read(&bytes).build();

    let mut sync = TelegramSynchronizer::new(quick());
    let err = sync.read_response(&mut transport, || None).await.unwrap_err();

    assert!(matches!(err, MBusError::ChecksumMismatch { .. }));
    assert_eq!(err.category(), ErrorCategory::CorruptFrame);
    assert!(sync.partial_response().is_none());
}

#[tokio::test]
async fn test_partial_data_block_is_kept() {
    let bytes = hex_to_bytes(ELS_ELSTER_HEX);
    let mut transport = Builder::new().read(&bytes).build();

    let mut sync = TelegramSynchronizer::new(quick());
    let err = sync.read_response(&mut transport, || None).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::UnsupportedField);
    let partial = sync.partial_response().unwrap();
    assert_eq!(partial.records().len(), 4);
}
