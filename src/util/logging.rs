//! # Frame Logging Utilities
//!
//! Bounded hex dumps of telegrams for protocol debugging.

/// Bytes of a frame shown before the dump is cut short.
const MAX_LOG_BYTES: usize = 64;

/// Log frame data as hex at debug level, limited to the first 64 bytes.
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }

    let display_data = &data[..data.len().min(MAX_LOG_BYTES)];
    let hex_str = crate::util::hex::format_hex_compact(display_data);
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" ... ({} bytes total)", data.len())
    } else {
        String::new()
    };

    log::debug!("{prefix}: {hex_str}{suffix}");
}

/// Log a discarded run of non-frame bytes at debug level.
pub fn log_noise(count: usize, data: &[u8]) {
    log::debug!(
        target: "mbus::sync",
        "Discarded {} noise byte(s): {}",
        count,
        crate::util::hex::format_hex_compact(&data[..data.len().min(16)])
    );
}
