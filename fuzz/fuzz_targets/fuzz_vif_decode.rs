#![no_main]

use libfuzzer_sys::fuzz_target;
use mbus_decode::payload::vif::parse_vib;
use mbus_decode::DataRecord;

fuzz_target!(|data: &[u8]| {
    let _ = parse_vib(data, 0);

    let mut offset = 0;
    while offset < data.len() {
        match DataRecord::decode_from(data, offset) {
            Ok((_, consumed)) if consumed > 0 => offset += consumed,
            _ => break,
        }
    }
});
