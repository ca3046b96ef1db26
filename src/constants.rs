//! M-Bus Protocol Constants
//!
//! This module defines constants used in the M-Bus protocol implementation,
//! based on the EN 13757 standard.

// ----------------------------------------------------------------------------
// Frame envelope
// ----------------------------------------------------------------------------

/// Single character acknowledgement
pub const MBUS_FRAME_ACK: u8 = 0xE5;

/// Short frame start byte
pub const MBUS_FRAME_SHORT_START: u8 = 0x10;

/// Control/long frame start byte
pub const MBUS_FRAME_LONG_START: u8 = 0x68;

/// Frame stop byte
pub const MBUS_FRAME_STOP: u8 = 0x16;

/// Bytes of a long frame that are not counted by the length field
/// (start, L, L, start, checksum, stop).
pub const MBUS_FRAME_LONG_OVERHEAD: usize = 6;

/// Length field value of a control frame (C, A, CI)
pub const MBUS_FRAME_CONTROL_LENGTH: u8 = 3;

/// Largest data block of a long frame (L = 255 minus C, A, CI)
pub const MBUS_FRAME_MAX_DATA_LENGTH: usize = 252;

/// Total size of a short frame
pub const MBUS_FRAME_SHORT_SIZE: usize = 5;

// ----------------------------------------------------------------------------
// Data information block
// ----------------------------------------------------------------------------

/// DIF (Data Information Field) mask for data length
pub const MBUS_DATA_RECORD_DIF_MASK_DATA: u8 = 0x0F;

/// DIF mask for function
pub const MBUS_DATA_RECORD_DIF_MASK_FUNCTION: u8 = 0x30;

/// DIF mask for storage number
pub const MBUS_DATA_RECORD_DIF_MASK_STORAGE_NO: u8 = 0x40;

/// DIFE (Data Information Field Extension) mask for storage number
pub const MBUS_DATA_RECORD_DIFE_MASK_STORAGE_NO: u8 = 0x0F;

/// DIFE mask for tariff
pub const MBUS_DATA_RECORD_DIFE_MASK_TARIFF: u8 = 0x30;

/// DIFE mask for device (subunit)
pub const MBUS_DATA_RECORD_DIFE_MASK_DEVICE: u8 = 0x40;

/// DIF idle filler
pub const MBUS_DIB_DIF_IDLE_FILLER: u8 = 0x2F;

/// DIF manufacturer specific
pub const MBUS_DIB_DIF_MANUFACTURER_SPECIFIC: u8 = 0x0F;

/// DIF more records follow
pub const MBUS_DIB_DIF_MORE_RECORDS_FOLLOW: u8 = 0x1F;

/// DIF extension bit
pub const MBUS_DIB_DIF_EXTENSION_BIT: u8 = 0x80;

/// Maximum number of DIFE bytes after a DIF
pub const MBUS_DIB_MAX_DIFE: usize = 10;

// ----------------------------------------------------------------------------
// Value information block
// ----------------------------------------------------------------------------

/// VIF extension bit
pub const MBUS_DIB_VIF_EXTENSION_BIT: u8 = 0x80;

/// Plain text VIF
pub const MBUS_VIF_PLAIN_TEXT: u8 = 0x7C;

/// Main VIF code extension table (0xFD)
pub const MBUS_VIF_EXTENSION_FD: u8 = 0xFD;

/// Alternate VIF code extension table (0xFB)
pub const MBUS_VIF_EXTENSION_FB: u8 = 0xFB;

/// Manufacturer specific VIF
pub const MBUS_VIF_MANUFACTURER_SPECIFIC: u8 = 0x7F;

/// Maximum number of VIFE bytes after a VIF
pub const MBUS_DIB_MAX_VIFE: usize = 10;

// ----------------------------------------------------------------------------
// Control/CI constants (aligned with libmbus)
// ----------------------------------------------------------------------------

/// Network layer (secondary addressing) address
pub const MBUS_ADDRESS_NETWORK_LAYER: u8 = 0xFD;

/// Broadcast address, no slave replies
pub const MBUS_ADDRESS_BROADCAST_NOREPLY: u8 = 0xFF;

// Control masks (full control bytes for common commands)
pub const MBUS_CONTROL_MASK_SND_NKE: u8 = 0x40;
pub const MBUS_CONTROL_MASK_SND_UD: u8 = 0x53; // includes DIR M2S
pub const MBUS_CONTROL_MASK_REQ_UD2: u8 = 0x5B; // includes DIR M2S
pub const MBUS_CONTROL_MASK_RSP_UD: u8 = 0x08; // S2M response

// Control flag bits
pub const MBUS_CONTROL_MASK_FCB: u8 = 0x20;

/// Bits of the control field that identify RSP_UD regardless of ACD/DFC
pub const MBUS_CONTROL_RSP_UD_MATCH_MASK: u8 = 0xCF;

// Control information (CI) codes
pub const MBUS_CONTROL_INFO_SELECT_SLAVE: u8 = 0x52;
pub const MBUS_CONTROL_INFO_ERROR_GENERAL: u8 = 0x70;
pub const MBUS_CONTROL_INFO_RESP_VARIABLE: u8 = 0x72;
pub const MBUS_CONTROL_INFO_RESP_VARIABLE_NO_HEADER: u8 = 0x78;
pub const MBUS_CONTROL_INFO_RESP_VARIABLE_SHORT: u8 = 0x7A;

/// Size of the fixed data header following CI 0x72
pub const MBUS_DATA_VARIABLE_HEADER_LENGTH: usize = 12;

/// Size of the short data header following CI 0x7A
pub const MBUS_DATA_SHORT_HEADER_LENGTH: usize = 4;
