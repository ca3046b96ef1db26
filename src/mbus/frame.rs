//! # M-Bus Frame Decoder
//!
//! This module decodes and encodes the M-Bus link layer envelope using the
//! `nom` crate: single character acknowledgements, short frames, control
//! frames and long frames.
//!
//! ```text
//! ACK      E5
//! Short    10 C A CS 16
//! Control  68 03 03 68 C A CI CS 16
//! Long     68 L L 68 C A CI data.. CS 16
//! ```
//!
//! The checksum is the modulo-256 sum of C, A, CI and the data bytes. A frame
//! that fails any envelope check is rejected as a whole.

use crate::constants::{
    MBUS_ADDRESS_NETWORK_LAYER, MBUS_CONTROL_INFO_SELECT_SLAVE, MBUS_CONTROL_MASK_FCB,
    MBUS_CONTROL_MASK_REQ_UD2, MBUS_CONTROL_MASK_RSP_UD, MBUS_CONTROL_MASK_SND_NKE,
    MBUS_CONTROL_MASK_SND_UD, MBUS_CONTROL_RSP_UD_MATCH_MASK, MBUS_FRAME_ACK,
    MBUS_FRAME_CONTROL_LENGTH, MBUS_FRAME_LONG_OVERHEAD, MBUS_FRAME_MAX_DATA_LENGTH, MBUS_FRAME_LONG_START,
    MBUS_FRAME_SHORT_SIZE, MBUS_FRAME_SHORT_START, MBUS_FRAME_STOP,
};
use crate::error::MBusError;
use crate::payload::variable_data::VariableDataStructure;
use nom::{
    bytes::complete::take,
    error::{Error as NomError, ErrorKind},
    number::complete::be_u8,
    Err as NomErr, IResult,
};
use serde::Serialize;

/// Represents an M-Bus frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MBusFrame {
    pub frame_type: MBusFrameType,
    pub control: u8,
    pub address: u8,
    pub control_information: u8,
    pub data: Vec<u8>,
    pub checksum: u8,
}

/// Represents the different types of M-Bus frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MBusFrameType {
    Ack,
    Short,
    Control,
    Long,
}

fn fail<T>(input: &[u8], kind: ErrorKind) -> IResult<&[u8], T> {
    Err(NomErr::Error(NomError::new(input, kind)))
}

fn stop_byte(input: &[u8]) -> IResult<&[u8], ()> {
    let (rest, stop) = be_u8(input)?;
    if stop != MBUS_FRAME_STOP {
        return fail(input, ErrorKind::Tag);
    }
    Ok((rest, ()))
}

/// Uses the `nom` crate to parse an M-Bus frame from a byte slice.
///
/// Only the envelope is checked here; see [`verify_frame`] for the checksum.
pub fn parse_frame(input: &[u8]) -> IResult<&[u8], MBusFrame> {
    let (input, start) = be_u8(input)?;

    match start {
        MBUS_FRAME_ACK => Ok((
            input,
            MBusFrame {
                frame_type: MBusFrameType::Ack,
                control: 0,
                address: 0,
                control_information: 0,
                data: Vec::new(),
                checksum: 0,
            },
        )),
        MBUS_FRAME_SHORT_START => {
            let (input, control) = be_u8(input)?;
            let (input, address) = be_u8(input)?;
            let (input, checksum) = be_u8(input)?;
            let (input, ()) = stop_byte(input)?;
            Ok((
                input,
                MBusFrame {
                    frame_type: MBusFrameType::Short,
                    control,
                    address,
                    control_information: 0,
                    data: Vec::new(),
                    checksum,
                },
            ))
        }
        MBUS_FRAME_LONG_START => {
            let (input, length1) = be_u8(input)?;
            let (input, length2) = be_u8(input)?;
            if length1 != length2 || length1 < MBUS_FRAME_CONTROL_LENGTH {
                return fail(input, ErrorKind::LengthValue);
            }
            let (input, start2) = be_u8(input)?;
            if start2 != MBUS_FRAME_LONG_START {
                return fail(input, ErrorKind::Tag);
            }
            let (input, control) = be_u8(input)?;
            let (input, address) = be_u8(input)?;
            let (input, control_information) = be_u8(input)?;
            let (input, data) = take(length1 as usize - 3)(input)?;
            let (input, checksum) = be_u8(input)?;
            let (input, ()) = stop_byte(input)?;

            let frame_type = if length1 == MBUS_FRAME_CONTROL_LENGTH {
                MBusFrameType::Control
            } else {
                MBusFrameType::Long
            };
            Ok((
                input,
                MBusFrame {
                    frame_type,
                    control,
                    address,
                    control_information,
                    data: data.to_vec(),
                    checksum,
                },
            ))
        }
        _ => fail(input, ErrorKind::Tag),
    }
}

/// Total frame size announced by the first bytes of `buffer`, if known.
pub fn expected_frame_len(buffer: &[u8]) -> Option<usize> {
    match buffer.first()? {
        &MBUS_FRAME_ACK => Some(1),
        &MBUS_FRAME_SHORT_START => Some(MBUS_FRAME_SHORT_SIZE),
        &MBUS_FRAME_LONG_START => buffer
            .get(1)
            .map(|l| *l as usize + MBUS_FRAME_LONG_OVERHEAD),
        _ => None,
    }
}

fn map_nom_error(buffer: &[u8], err: NomErr<NomError<&[u8]>>) -> MBusError {
    match err {
        NomErr::Error(e) | NomErr::Failure(e) if e.code == ErrorKind::Eof => {
            let needed = expected_frame_len(buffer).unwrap_or(MBUS_FRAME_SHORT_SIZE);
            MBusError::truncated_frame(buffer, needed.max(buffer.len() + 1))
        }
        NomErr::Error(e) | NomErr::Failure(e) => MBusError::FrameParseError(format!(
            "{:?} at offset {}",
            e.code,
            buffer.len() - e.input.len()
        )),
        NomErr::Incomplete(_) => MBusError::truncated_frame(buffer, buffer.len() + 1),
    }
}

/// Parses exactly one frame occupying all of `buffer` and verifies its checksum.
pub fn decode_frame(buffer: &[u8]) -> Result<MBusFrame, MBusError> {
    let (rest, frame) = parse_frame(buffer).map_err(|e| map_nom_error(buffer, e))?;
    if !rest.is_empty() {
        return Err(MBusError::FrameParseError(format!(
            "length field covers {} bytes, window holds {}",
            buffer.len() - rest.len(),
            buffer.len()
        )));
    }
    verify_frame(&frame)?;
    Ok(frame)
}

fn length_field(data: &[u8]) -> Result<u8, MBusError> {
    if data.len() > MBUS_FRAME_MAX_DATA_LENGTH {
        return Err(MBusError::FrameParseError(format!(
            "{} data bytes exceed the long frame maximum of {}",
            data.len(),
            MBUS_FRAME_MAX_DATA_LENGTH
        )));
    }
    Ok(data.len() as u8 + 3)
}

/// Packs an M-Bus frame into a byte vector.
///
/// Fails when the data block does not fit the length field.
pub fn pack_frame(frame: &MBusFrame) -> Result<Vec<u8>, MBusError> {
    let mut data = Vec::with_capacity(frame.data.len() + MBUS_FRAME_LONG_OVERHEAD + 3);

    match frame.frame_type {
        MBusFrameType::Ack => data.push(MBUS_FRAME_ACK),
        MBusFrameType::Short => {
            data.push(MBUS_FRAME_SHORT_START);
            data.push(frame.control);
            data.push(frame.address);
            data.push(frame.checksum);
            data.push(MBUS_FRAME_STOP);
        }
        MBusFrameType::Control | MBusFrameType::Long => {
            let length = length_field(&frame.data)?;
            data.push(MBUS_FRAME_LONG_START);
            data.push(length);
            data.push(length);
            data.push(MBUS_FRAME_LONG_START);
            data.push(frame.control);
            data.push(frame.address);
            data.push(frame.control_information);
            data.extend_from_slice(&frame.data);
            data.push(frame.checksum);
            data.push(MBUS_FRAME_STOP);
        }
    }

    Ok(data)
}

/// Verifies the integrity of an M-Bus frame.
pub fn verify_frame(frame: &MBusFrame) -> Result<(), MBusError> {
    let calculated = calculate_checksum(frame);
    if frame.checksum != calculated {
        log::warn!(
            "Checksum mismatch for frame from address {}: expected 0x{:02X}, calculated 0x{:02X}",
            frame.address,
            frame.checksum,
            calculated
        );
        return Err(MBusError::ChecksumMismatch {
            expected: frame.checksum,
            calculated,
        });
    }
    Ok(())
}

/// Calculates the checksum of an M-Bus frame.
pub fn calculate_checksum(frame: &MBusFrame) -> u8 {
    match frame.frame_type {
        MBusFrameType::Ack => 0,
        MBusFrameType::Short => frame.control.wrapping_add(frame.address),
        MBusFrameType::Control | MBusFrameType::Long => frame
            .data
            .iter()
            .fold(
                frame
                    .control
                    .wrapping_add(frame.address)
                    .wrapping_add(frame.control_information),
                |sum, b| sum.wrapping_add(*b),
            ),
    }
}

impl MBusFrame {
    /// Single character acknowledgement.
    pub fn ack() -> Self {
        MBusFrame {
            frame_type: MBusFrameType::Ack,
            control: 0,
            address: 0,
            control_information: 0,
            data: Vec::new(),
            checksum: 0,
        }
    }

    /// Short frame with its checksum filled in.
    pub fn short(control: u8, address: u8) -> Self {
        let mut frame = MBusFrame {
            frame_type: MBusFrameType::Short,
            control,
            address,
            control_information: 0,
            data: Vec::new(),
            checksum: 0,
        };
        frame.checksum = calculate_checksum(&frame);
        frame
    }

    /// Control or long frame with its checksum filled in.
    ///
    /// Fails for data blocks longer than 252 bytes.
    pub fn long(
        control: u8,
        address: u8,
        control_information: u8,
        data: Vec<u8>,
    ) -> Result<Self, MBusError> {
        length_field(&data)?;
        let frame_type = if data.is_empty() {
            MBusFrameType::Control
        } else {
            MBusFrameType::Long
        };
        let mut frame = MBusFrame {
            frame_type,
            control,
            address,
            control_information,
            data,
            checksum: 0,
        };
        frame.checksum = calculate_checksum(&frame);
        Ok(frame)
    }

    /// REQ_UD2 with the given frame count bit.
    pub fn req_ud2(address: u8, fcb: bool) -> Self {
        let control = if fcb {
            MBUS_CONTROL_MASK_REQ_UD2 | MBUS_CONTROL_MASK_FCB
        } else {
            MBUS_CONTROL_MASK_REQ_UD2
        };
        MBusFrame::short(control, address)
    }

    /// SND_NKE, the link reset.
    pub fn snd_nke(address: u8) -> Self {
        MBusFrame::short(MBUS_CONTROL_MASK_SND_NKE, address)
    }

    /// Whether the control field is a RSP_UD, ignoring the ACD and DFC bits.
    pub fn is_rsp_ud(&self) -> bool {
        self.control & MBUS_CONTROL_RSP_UD_MATCH_MASK == MBUS_CONTROL_MASK_RSP_UD
    }
}

/// Packs a select frame for secondary address selection.
///
/// `mask` is 16 hex digits: identification (8), manufacturer (4), version (2)
/// and medium (2). `F` in the identification part is a wildcard digit.
pub fn pack_select_frame(frame: &mut MBusFrame, mask: &str) -> Result<(), MBusError> {
    let cleaned: String = mask.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() != 16 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(MBusError::InvalidHexString);
    }
    let digits: Vec<u8> = cleaned
        .chars()
        .filter_map(|c| c.to_digit(16).map(|d| d as u8))
        .collect();
    let byte = |i: usize| (digits[i] << 4) | digits[i + 1];

    let mut data = [0u8; 8];
    // identification, least significant BCD byte first
    for (slot, pos) in data[0..4].iter_mut().zip([6, 4, 2, 0]) {
        *slot = byte(pos);
    }
    // manufacturer, low byte first
    data[4] = byte(10);
    data[5] = byte(8);
    data[6] = byte(12);
    data[7] = byte(14);

    *frame = MBusFrame::long(
        MBUS_CONTROL_MASK_SND_UD | MBUS_CONTROL_MASK_FCB,
        MBUS_ADDRESS_NETWORK_LAYER,
        MBUS_CONTROL_INFO_SELECT_SLAVE,
        data.to_vec(),
    )?;
    Ok(())
}

/// One physical telegram after envelope and checksum validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MBusMessage {
    frame_type: MBusFrameType,
    address_field: u8,
    control_field: u8,
    control_information: u8,
    payload: Vec<u8>,
}

impl MBusMessage {
    /// Decodes the frame held in the first `length` bytes of `buffer`.
    ///
    /// The frame must fill the window exactly.
    pub fn decode(buffer: &[u8], length: usize) -> Result<Self, MBusError> {
        if length > buffer.len() {
            return Err(MBusError::truncated_frame(buffer, length));
        }
        let frame = decode_frame(&buffer[..length])?;
        Ok(MBusMessage::from(frame))
    }

    pub fn frame_type(&self) -> MBusFrameType {
        self.frame_type
    }

    pub fn address_field(&self) -> u8 {
        self.address_field
    }

    pub fn control_field(&self) -> u8 {
        self.control_field
    }

    pub fn control_information(&self) -> u8 {
        self.control_information
    }

    /// Bytes after the CI field.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decodes the payload into `vds`; records decoded before a failure stay in `vds`.
    pub fn decode_variable_data(&self, vds: &mut VariableDataStructure) -> Result<(), MBusError> {
        vds.decode(self.control_information, &self.payload)
    }

    pub fn variable_data_structure(&self) -> Result<VariableDataStructure, MBusError> {
        VariableDataStructure::decode_from(self.control_information, &self.payload)
    }
}

impl From<MBusFrame> for MBusMessage {
    fn from(frame: MBusFrame) -> Self {
        MBusMessage {
            frame_type: frame.frame_type,
            address_field: frame.address,
            control_field: frame.control,
            control_information: frame.control_information,
            payload: frame.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex::hex_to_bytes;

    const BUSY: &str = "68040468080170088116";

    #[test]
    fn test_parse_ack() {
        let (rest, frame) = parse_frame(&[0xE5]).unwrap();
        assert!(rest.is_empty());
        assert_eq!(frame.frame_type, MBusFrameType::Ack);
    }

    #[test]
    fn test_short_frame_roundtrip() {
        let frame = MBusFrame::req_ud2(0x01, true);
        let bytes = pack_frame(&frame).unwrap();
        assert_eq!(bytes, vec![0x10, 0x7B, 0x01, 0x7C, 0x16]);
        assert_eq!(decode_frame(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_snd_nke() {
        assert_eq!(
            pack_frame(&MBusFrame::snd_nke(0x05)).unwrap(),
            vec![0x10, 0x40, 0x05, 0x45, 0x16]
        );
    }

    #[test]
    fn test_control_frame() {
        let frame = MBusFrame::long(0x53, 0x01, 0x51, Vec::new()).unwrap();
        assert_eq!(frame.frame_type, MBusFrameType::Control);
        let bytes = pack_frame(&frame).unwrap();
        assert_eq!(bytes, vec![0x68, 0x03, 0x03, 0x68, 0x53, 0x01, 0x51, 0xA5, 0x16]);
        assert_eq!(decode_frame(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_long_frame() {
        let bytes = hex_to_bytes(BUSY);
        let message = MBusMessage::decode(&bytes, bytes.len()).unwrap();
        assert_eq!(message.frame_type(), MBusFrameType::Long);
        assert_eq!(message.address_field(), 0x01);
        assert_eq!(message.control_field(), 0x08);
        assert_eq!(message.control_information(), 0x70);
        assert_eq!(message.payload(), &[0x08]);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = hex_to_bytes(BUSY);
        bytes[8] = 0x82;
        assert!(matches!(
            decode_frame(&bytes),
            Err(MBusError::ChecksumMismatch { expected: 0x82, calculated: 0x81 })
        ));
    }

    #[test]
    fn test_bad_stop_byte() {
        let mut bytes = hex_to_bytes(BUSY);
        bytes[9] = 0x17;
        assert!(matches!(decode_frame(&bytes), Err(MBusError::FrameParseError(_))));
    }

    #[test]
    fn test_length_fields_disagree() {
        let bytes = hex_to_bytes("68040568080170088116");
        assert!(matches!(decode_frame(&bytes), Err(MBusError::FrameParseError(_))));
    }

    #[test]
    fn test_truncated_frame() {
        let bytes = hex_to_bytes(BUSY);
        let err = decode_frame(&bytes[..7]).unwrap_err();
        assert!(matches!(
            err,
            MBusError::TruncatedFrame { needed: 10, available: 7 }
        ));

        assert!(matches!(
            MBusMessage::decode(&bytes, 12),
            Err(MBusError::TruncatedFrame { needed: 12, available: 10 })
        ));
    }

    #[test]
    fn test_window_longer_than_frame() {
        let mut bytes = hex_to_bytes(BUSY);
        bytes.push(0x00);
        assert!(matches!(
            MBusMessage::decode(&bytes, bytes.len()),
            Err(MBusError::FrameParseError(_))
        ));
    }

    #[test]
    fn test_bad_start_byte() {
        assert!(matches!(
            decode_frame(&[0x01, 0x03, 0x03, 0x07]),
            Err(MBusError::FrameParseError(_))
        ));
    }

    #[test]
    fn test_select_frame() {
        let mut frame = MBusFrame::ack();
        pack_select_frame(&mut frame, "12345678FFFFFFFF").unwrap();
        assert_eq!(frame.frame_type, MBusFrameType::Long);
        assert_eq!(frame.address, 0xFD);
        assert_eq!(frame.control_information, 0x52);
        assert_eq!(
            frame.data,
            vec![0x78, 0x56, 0x34, 0x12, 0xFF, 0xFF, 0xFF, 0xFF]
        );
        verify_frame(&frame).unwrap();

        assert!(pack_select_frame(&mut frame, "1234").is_err());
    }

    #[test]
    fn test_rsp_ud_match() {
        assert!(MBusFrame::long(0x08, 1, 0x72, vec![0]).unwrap().is_rsp_ud());
        assert!(MBusFrame::long(0x28, 1, 0x72, vec![0]).unwrap().is_rsp_ud());
        assert!(!MBusFrame::long(0x53, 1, 0x51, vec![0]).unwrap().is_rsp_ud());
    }

    #[test]
    fn test_data_block_limit() {
        let frame = MBusFrame::long(0x08, 1, 0x72, vec![0x2F; 252]).unwrap();
        let bytes = pack_frame(&frame).unwrap();
        assert_eq!(&bytes[..3], &[0x68, 0xFF, 0xFF]);
        assert_eq!(decode_frame(&bytes).unwrap(), frame);

        assert!(matches!(
            MBusFrame::long(0x08, 1, 0x72, vec![0x2F; 253]),
            Err(MBusError::FrameParseError(_))
        ));

        let mut oversized = frame;
        oversized.data.push(0x2F);
        assert!(pack_frame(&oversized).is_err());
    }
}
