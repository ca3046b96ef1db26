#![no_main]

use libfuzzer_sys::fuzz_target;
use mbus_decode::payload::data_encoding::{
    decode_bcd, decode_int, decode_real, decode_text, MBusDateTime,
};

fuzz_target!(|data: &[u8]| {
    for len in 1..=data.len().min(8) {
        let _ = decode_int(&data[..len]);
        let _ = decode_bcd(&data[..len]);
    }

    if data.len() >= 4 {
        let _ = decode_real(&data[..4]);
    }

    for len in [2, 3, 4, 6] {
        if data.len() >= len {
            if let Ok(dt) = MBusDateTime::decode(&data[..len]) {
                let _ = dt.to_naive();
            }
        }
    }

    let _ = decode_text(data);
});
