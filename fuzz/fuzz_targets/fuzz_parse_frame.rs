#![no_main]

use libfuzzer_sys::fuzz_target;
use mbus_decode::mbus::frame::{decode_frame, expected_frame_len, pack_frame, parse_frame};
use mbus_decode::TelegramSynchronizer;

fuzz_target!(|data: &[u8]| {
    let _ = expected_frame_len(data);

    // Anything the parser accepts must pack back to the bytes it came from.
    if let Ok((rest, frame)) = parse_frame(data) {
        let consumed = data.len() - rest.len();
        let packed = pack_frame(&frame).expect("a parsed length field always fits");
        assert_eq!(packed, &data[..consumed]);
    }

    // Full decode never panics, even on checksum-valid garbage.
    let _ = mbus_decode::decode_telegram(data);
    let _ = decode_frame(data);

    let mut sync = TelegramSynchronizer::default();
    sync.push_bytes(data);
    while let Ok(Some(_)) = sync.poll_frame() {}
});
