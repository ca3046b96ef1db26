//! Tests for the logging helpers of the `mbus-decode` crate.

use mbus_decode::logging::{init_logger, log_debug, log_error, log_info, log_warn};
use mbus_decode::util::log_frame_hex;

/// Tests that the leveled helpers do not panic after init.
#[test]
fn test_logging() {
    init_logger();
    log_error("This is an error message");
    log_warn("This is a warning message");
    log_info("This is an info message");
    log_debug("This is a debug message");
}

/// Tests that initializing twice keeps the first logger.
#[test]
fn test_init_logger_twice() {
    init_logger();
    init_logger();
}

#[test]
fn test_frame_dump_of_long_telegram() {
    init_logger();
    log_frame_hex("Telegram", &[0x68; 300]);
    log_frame_hex("Telegram", &[]);
}
