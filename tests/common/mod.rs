#![allow(dead_code)]

use mbus_decode::mbus::frame::{pack_frame, MBusFrame};

pub fn hex_to_bytes(hex: &str) -> Vec<u8> {
    hex::decode(hex).unwrap()
}

/// Heat meter, CI 0x72, six records.
pub const EXAMPLE_DATA_01_HEX: &str = "6831316808017245585703B40534049E0027B60306F934150315C6004D052E00000000053D00000000055B22F32642055FC7DA0D42FA16";

/// EDC heat meter with subunit records and plain-text units.
pub const EDC_HEX: &str = "68AEAE682801729508121183140204170000008400863B230000008400863CD10100008440863B000000008440863C0000000085005B2B4BAC4185005F20D7AC4185405B0000B84285405F0000B84285003B8400353F85403B0000000095003B95CFB24395403B0000000085002B0000000085402B0000000095002BD39F904695402B00000000046D190F8A1784007C0143F30D000084407C01439D01000084007C01630100000084407C0163010000000F2F16";

pub const APPLICATION_BUSY_HEX: &str = "68040468080170088116";

/// Engelmann heat meter with storage numbers and tariffs.
pub const EFE_ENGELMANN_HEX: &str = "68A1A16808007245330824C5140004662700000478917B6F01046D172ECC13041500000000441500000000840115000000000406000000004406000000008401060000000084100600000000C410060000000084110600000000426CBF1C026CDF1C8420060000000084300600000000043B00000000143B19000000042B00000000142B0B000000025B1600025F150004610900000002230C0201FD17000490280B000000EB16";

/// Elster meter whose fifth record carries non-decimal BCD digits.
pub const ELS_ELSTER_HEX: &str = "686868680800725139494493152F04A17000000C06000000008C1006000000008C2013000000000C13000000003C2BBDEBDDDD3B3BBDEBDD0A5A27020A5E26020A6201000A273007046D090DCD134C06000000004C1300000000CC100600000000CC201300000000426CBF154016";

/// Long data header used for synthetic telegrams.
pub const HEADER_HEX: &str = "45585703B40534049E0027B6";

/// RSP_UD telegram from `address` with a long header followed by `records_hex`.
pub fn rsp_ud(address: u8, records_hex: &str) -> Vec<u8> {
    let mut data = hex_to_bytes(HEADER_HEX);
    data.extend(hex_to_bytes(records_hex));
    pack_frame(&MBusFrame::long(0x08, address, 0x72, data).unwrap()).unwrap()
}

/// First telegram of a two-part answer: energy 1 Wh, then the 0x1F marker.
pub fn first_of_two(address: u8) -> Vec<u8> {
    rsp_ud(address, "0403010000001F")
}

/// Last telegram of a two-part answer: volume 2 l.
pub fn second_of_two(address: u8) -> Vec<u8> {
    rsp_ud(address, "041302000000")
}
