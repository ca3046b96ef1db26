//! # Variable Data Structure
//!
//! Decodes the application data of a RSP_UD telegram: the fixed data header
//! selected by the CI field, followed by a sequence of data records that may
//! end in manufacturer-specific data.

use crate::constants::{
    MBUS_CONTROL_INFO_ERROR_GENERAL, MBUS_CONTROL_INFO_RESP_VARIABLE,
    MBUS_CONTROL_INFO_RESP_VARIABLE_NO_HEADER, MBUS_CONTROL_INFO_RESP_VARIABLE_SHORT,
    MBUS_DATA_SHORT_HEADER_LENGTH, MBUS_DATA_VARIABLE_HEADER_LENGTH, MBUS_DIB_DIF_IDLE_FILLER,
    MBUS_DIB_DIF_MANUFACTURER_SPECIFIC, MBUS_DIB_DIF_MORE_RECORDS_FOLLOW,
};
use crate::error::MBusError;
use crate::payload::data_encoding::{decode_bcd, mbus_decode_manufacturer};
use crate::payload::record::DataRecord;
use crate::util::hex::format_hex_compact;
use bitflags::bitflags;
use serde::Serialize;
use std::fmt;

bitflags! {
    /// Status byte of the fixed data header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct StatusFlags: u8 {
        const APPLICATION_BUSY = 0x01;
        const APPLICATION_ERROR = 0x02;
        const POWER_LOW = 0x04;
        const PERMANENT_ERROR = 0x08;
        const TEMPORARY_ERROR = 0x10;
        const MANUFACTURER_1 = 0x20;
        const MANUFACTURER_2 = 0x40;
        const MANUFACTURER_3 = 0x80;
    }
}

/// Medium / device type byte of the secondary address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceType {
    Other,
    Oil,
    Electricity,
    Gas,
    HeatMeterOutlet,
    Steam,
    WarmWater,
    Water,
    HeatCostAllocator,
    CompressedAir,
    CoolingMeterOutlet,
    CoolingMeterInlet,
    HeatMeterInlet,
    HeatCoolingMeter,
    BusSystemComponent,
    UnknownMedium,
    HotWater,
    ColdWater,
    DualRegisterWater,
    Pressure,
    AdConverter,
    SmokeDetector,
    RoomSensor,
    GasDetector,
    Breaker,
    Valve,
    CustomerUnit,
    WasteWater,
    Garbage,
    CommunicationController,
    UnidirectionalRepeater,
    BidirectionalRepeater,
    RadioConverterSystemSide,
    RadioConverterMeterSide,
    Reserved(u8),
}

impl From<u8> for DeviceType {
    fn from(code: u8) -> Self {
        match code {
            0x00 => DeviceType::Other,
            0x01 => DeviceType::Oil,
            0x02 => DeviceType::Electricity,
            0x03 => DeviceType::Gas,
            0x04 => DeviceType::HeatMeterOutlet,
            0x05 => DeviceType::Steam,
            0x06 => DeviceType::WarmWater,
            0x07 => DeviceType::Water,
            0x08 => DeviceType::HeatCostAllocator,
            0x09 => DeviceType::CompressedAir,
            0x0A => DeviceType::CoolingMeterOutlet,
            0x0B => DeviceType::CoolingMeterInlet,
            0x0C => DeviceType::HeatMeterInlet,
            0x0D => DeviceType::HeatCoolingMeter,
            0x0E => DeviceType::BusSystemComponent,
            0x0F => DeviceType::UnknownMedium,
            0x15 => DeviceType::HotWater,
            0x16 => DeviceType::ColdWater,
            0x17 => DeviceType::DualRegisterWater,
            0x18 => DeviceType::Pressure,
            0x19 => DeviceType::AdConverter,
            0x1A => DeviceType::SmokeDetector,
            0x1B => DeviceType::RoomSensor,
            0x1C => DeviceType::GasDetector,
            0x20 => DeviceType::Breaker,
            0x21 => DeviceType::Valve,
            0x25 => DeviceType::CustomerUnit,
            0x28 => DeviceType::WasteWater,
            0x29 => DeviceType::Garbage,
            0x31 => DeviceType::CommunicationController,
            0x32 => DeviceType::UnidirectionalRepeater,
            0x33 => DeviceType::BidirectionalRepeater,
            0x36 => DeviceType::RadioConverterSystemSide,
            0x37 => DeviceType::RadioConverterMeterSide,
            other => DeviceType::Reserved(other),
        }
    }
}

/// Identification part of the long data header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecondaryAddress {
    /// `None` when the identification digits are not plain BCD.
    pub identification: Option<u32>,
    /// Identification bytes as transmitted, least significant first.
    pub raw_identification: [u8; 4],
    pub manufacturer: String,
    pub version: u8,
    pub device_type: DeviceType,
}

impl fmt::Display for SecondaryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identification {
            Some(id) => write!(f, "id:{id:08}")?,
            None => {
                write!(f, "id:")?;
                for b in self.raw_identification.iter().rev() {
                    write!(f, "{b:02X}")?;
                }
            }
        }
        write!(
            f,
            ", manufacturer:{}, version:{}, device type:{:?}",
            self.manufacturer, self.version, self.device_type
        )
    }
}

/// Fixed data header following CI 0x72 (long) or 0x7A (short).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataHeader {
    /// Present for the long header only.
    pub secondary_address: Option<SecondaryAddress>,
    pub access_number: u8,
    pub status: StatusFlags,
    /// Raw configuration word; encrypted payloads are not decoded.
    pub signature: u16,
}

impl DataHeader {
    fn decode_long(h: &[u8]) -> Self {
        let raw_identification = [h[0], h[1], h[2], h[3]];
        let identification = match decode_bcd(&raw_identification) {
            Ok(bcd) if bcd.value() >= 0 => u32::try_from(bcd.value()).ok(),
            _ => None,
        };
        if identification.is_none() {
            log::warn!(
                "Identification {} is not BCD, keeping the raw bytes",
                format_hex_compact(&raw_identification)
            );
        }

        DataHeader {
            secondary_address: Some(SecondaryAddress {
                identification,
                raw_identification,
                manufacturer: mbus_decode_manufacturer(h[5], h[4]),
                version: h[6],
                device_type: DeviceType::from(h[7]),
            }),
            access_number: h[8],
            status: StatusFlags::from_bits_retain(h[9]),
            signature: u16::from_le_bytes([h[10], h[11]]),
        }
    }

    fn decode_short(h: &[u8]) -> Self {
        DataHeader {
            secondary_address: None,
            access_number: h[0],
            status: StatusFlags::from_bits_retain(h[1]),
            signature: u16::from_le_bytes([h[2], h[3]]),
        }
    }
}

// A cut-off fixed header leaves nothing usable in the telegram.
fn header_bytes(buffer: &[u8], len: usize) -> Result<&[u8], MBusError> {
    buffer
        .get(..len)
        .ok_or_else(|| MBusError::truncated_frame(buffer, len))
}

/// Data records and header of one response, possibly merged from several
/// telegrams.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct VariableDataStructure {
    control_information: u8,
    header: Option<DataHeader>,
    records: Vec<DataRecord>,
    manufacturer_data: Vec<u8>,
    more_records_follow: bool,
    application_error: Option<u8>,
}

impl VariableDataStructure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `buffer` (the bytes after the CI field) into this structure.
    ///
    /// Records are pushed as they are decoded; when a record fails, the
    /// records before it stay in place and the error is returned. Records
    /// accumulate across calls, the continuation flag reflects the last block.
    pub fn decode(&mut self, control_information: u8, buffer: &[u8]) -> Result<(), MBusError> {
        self.control_information = control_information;
        self.more_records_follow = false;

        let start = match control_information {
            MBUS_CONTROL_INFO_RESP_VARIABLE => {
                let h = header_bytes(buffer, MBUS_DATA_VARIABLE_HEADER_LENGTH)?;
                self.header = Some(DataHeader::decode_long(h));
                MBUS_DATA_VARIABLE_HEADER_LENGTH
            }
            MBUS_CONTROL_INFO_RESP_VARIABLE_SHORT => {
                let h = header_bytes(buffer, MBUS_DATA_SHORT_HEADER_LENGTH)?;
                self.header = Some(DataHeader::decode_short(h));
                MBUS_DATA_SHORT_HEADER_LENGTH
            }
            MBUS_CONTROL_INFO_RESP_VARIABLE_NO_HEADER => 0,
            MBUS_CONTROL_INFO_ERROR_GENERAL => {
                self.application_error = buffer.first().copied();
                return Ok(());
            }
            other => {
                return Err(MBusError::UnsupportedEncoding(format!(
                    "CI field 0x{other:02X}"
                )))
            }
        };

        self.decode_records(buffer, start)
    }

    /// Decodes a fresh structure, discarding partial results on error.
    pub fn decode_from(control_information: u8, buffer: &[u8]) -> Result<Self, MBusError> {
        let mut vds = VariableDataStructure::new();
        vds.decode(control_information, buffer)?;
        Ok(vds)
    }

    fn decode_records(&mut self, buffer: &[u8], mut offset: usize) -> Result<(), MBusError> {
        while offset < buffer.len() {
            let dif = buffer[offset];

            if dif == MBUS_DIB_DIF_IDLE_FILLER {
                offset += 1;
                continue;
            }
            if dif & 0xEF == MBUS_DIB_DIF_MANUFACTURER_SPECIFIC {
                if dif == MBUS_DIB_DIF_MORE_RECORDS_FOLLOW {
                    self.more_records_follow = true;
                }
                self.manufacturer_data
                    .extend_from_slice(&buffer[offset + 1..]);
                return Ok(());
            }

            let mut record = DataRecord::new();
            match record.decode(buffer, offset) {
                Ok(consumed) => {
                    self.records.push(record);
                    offset += consumed;
                }
                Err(e) => {
                    log::warn!(
                        "Record {} at offset {} failed to decode: {}",
                        self.records.len(),
                        offset,
                        e
                    );
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Merges the records of a continuation telegram, keeping telegram order.
    pub fn append(&mut self, next: VariableDataStructure) {
        if self.header.is_none() {
            self.header = next.header;
        }
        self.records.extend(next.records);
        self.manufacturer_data.extend(next.manufacturer_data);
        self.more_records_follow = next.more_records_follow;
        if next.application_error.is_some() {
            self.application_error = next.application_error;
        }
    }

    pub fn control_information(&self) -> u8 {
        self.control_information
    }

    pub fn header(&self) -> Option<&DataHeader> {
        self.header.as_ref()
    }

    pub fn secondary_address(&self) -> Option<&SecondaryAddress> {
        self.header.as_ref()?.secondary_address.as_ref()
    }

    pub fn records(&self) -> &[DataRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<DataRecord> {
        self.records
    }

    pub fn manufacturer_data(&self) -> &[u8] {
        &self.manufacturer_data
    }

    pub fn more_records_follow(&self) -> bool {
        self.more_records_follow
    }

    /// Error byte of a CI 0x70 application error telegram.
    pub fn application_error(&self) -> Option<u8> {
        self.application_error
    }
}

impl fmt::Display for VariableDataStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(header) = &self.header {
            if let Some(address) = &header.secondary_address {
                writeln!(f, "{address}")?;
            }
            writeln!(
                f,
                "access number:{}, status:0x{:02X}, signature:0x{:04X}",
                header.access_number,
                header.status.bits(),
                header.signature
            )?;
        }
        if let Some(code) = self.application_error {
            writeln!(f, "application error:0x{code:02X}")?;
        }
        for record in &self.records {
            writeln!(f, "{record}")?;
        }
        if !self.manufacturer_data.is_empty() {
            writeln!(
                f,
                "manufacturer data:{}",
                format_hex_compact(&self.manufacturer_data)
            )?;
        }
        if self.more_records_follow {
            writeln!(f, "more records follow")?;
        }
        Ok(())
    }
}
