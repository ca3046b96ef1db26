//! # M-Bus Data Record
//!
//! A data record is one field of the variable data block: a data information
//! block (DIF + DIFE chain), a value information block (VIF + VIFE chain) and
//! the value bytes whose layout the DIF selects.

use crate::constants::{
    MBUS_DATA_RECORD_DIFE_MASK_DEVICE, MBUS_DATA_RECORD_DIFE_MASK_STORAGE_NO,
    MBUS_DATA_RECORD_DIFE_MASK_TARIFF, MBUS_DATA_RECORD_DIF_MASK_DATA,
    MBUS_DATA_RECORD_DIF_MASK_FUNCTION, MBUS_DATA_RECORD_DIF_MASK_STORAGE_NO,
    MBUS_DIB_DIF_EXTENSION_BIT, MBUS_DIB_MAX_DIFE,
};
use crate::error::MBusError;
use crate::payload::data_encoding::{
    byte_at, decode_bcd, decode_int, decode_real, decode_text, take_bytes, Bcd, MBusDateTime,
};
use crate::payload::vif::{parse_vib, ValueInformation, VifModifier};
use crate::payload::vif_maps::{Description, DlmsUnit};
use crate::util::hex::format_hex_compact;
use serde::Serialize;
use std::fmt;

/// Function field of the DIF (bits 4-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionField {
    #[default]
    Instantaneous,
    Maximum,
    Minimum,
    Error,
}

impl FunctionField {
    fn from_dif(dif: u8) -> Self {
        match (dif & MBUS_DATA_RECORD_DIF_MASK_FUNCTION) >> 4 {
            0 => FunctionField::Instantaneous,
            1 => FunctionField::Maximum,
            2 => FunctionField::Minimum,
            _ => FunctionField::Error,
        }
    }
}

impl fmt::Display for FunctionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FunctionField::Instantaneous => "instantaneous",
            FunctionField::Maximum => "maximum",
            FunctionField::Minimum => "minimum",
            FunctionField::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataValueType {
    Long,
    Double,
    Date,
    ByteArray,
    String,
    Bcd,
    None,
}

/// Decoded value of a data record.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub enum DataValue {
    #[default]
    None,
    Long(i64),
    Double(f64),
    Date(MBusDateTime),
    String(String),
    Bcd(Bcd),
    Bytes(Vec<u8>),
}

impl DataValue {
    pub fn value_type(&self) -> DataValueType {
        match self {
            DataValue::None => DataValueType::None,
            DataValue::Long(_) => DataValueType::Long,
            DataValue::Double(_) => DataValueType::Double,
            DataValue::Date(_) => DataValueType::Date,
            DataValue::String(_) => DataValueType::String,
            DataValue::Bcd(_) => DataValueType::Bcd,
            DataValue::Bytes(_) => DataValueType::ByteArray,
        }
    }

    /// Numeric view of the value, unscaled.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Long(v) => Some(*v as f64),
            DataValue::Double(v) => Some(*v),
            DataValue::Bcd(b) => Some(b.value() as f64),
            _ => None,
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::None => f.write_str("none"),
            DataValue::Long(v) => write!(f, "{v}"),
            DataValue::Double(v) => write!(f, "{v}"),
            DataValue::Date(d) => write!(f, "{d}"),
            DataValue::String(s) => f.write_str(s),
            DataValue::Bcd(b) => write!(f, "{b}"),
            DataValue::Bytes(b) => f.write_str(&format_hex_compact(b)),
        }
    }
}

/// One decoded data record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRecord {
    dib: Vec<u8>,
    vib: Vec<u8>,
    function_field: FunctionField,
    storage_number: u64,
    tariff: u32,
    subunit: u32,
    description: Description,
    user_defined_description: Option<String>,
    unit: Option<DlmsUnit>,
    exponent: Option<i32>,
    modifiers: Vec<VifModifier>,
    value: DataValue,
}

impl Default for DataRecord {
    fn default() -> Self {
        DataRecord::new()
    }
}

struct DataInformation {
    dib: Vec<u8>,
    data_field: u8,
    function_field: FunctionField,
    storage_number: u64,
    tariff: u32,
    subunit: u32,
}

fn parse_dib(buffer: &[u8], offset: usize) -> Result<(DataInformation, usize), MBusError> {
    let dif = byte_at(buffer, offset)?;
    let data_field = dif & MBUS_DATA_RECORD_DIF_MASK_DATA;
    if data_field == 0x0F {
        return Err(MBusError::MalformedHeader(format!(
            "special function DIF 0x{dif:02X} at offset {offset}"
        )));
    }

    let mut info = DataInformation {
        dib: vec![dif],
        data_field,
        function_field: FunctionField::from_dif(dif),
        storage_number: ((dif & MBUS_DATA_RECORD_DIF_MASK_STORAGE_NO) >> 6) as u64,
        tariff: 0,
        subunit: 0,
    };

    let mut pos = offset + 1;
    let mut extended = dif & MBUS_DIB_DIF_EXTENSION_BIT != 0;
    let mut n = 0;
    while extended {
        if n == MBUS_DIB_MAX_DIFE {
            return Err(MBusError::MalformedHeader(format!(
                "more than {MBUS_DIB_MAX_DIFE} DIFE bytes at offset {pos}"
            )));
        }
        let dife = byte_at(buffer, pos)?;
        pos += 1;
        info.dib.push(dife);

        info.storage_number |=
            ((dife & MBUS_DATA_RECORD_DIFE_MASK_STORAGE_NO) as u64) << (4 * n + 1);
        info.tariff |= (((dife & MBUS_DATA_RECORD_DIFE_MASK_TARIFF) >> 4) as u32) << (2 * n);
        info.subunit |= (((dife & MBUS_DATA_RECORD_DIFE_MASK_DEVICE) >> 6) as u32) << n;

        extended = dife & MBUS_DIB_DIF_EXTENSION_BIT != 0;
        n += 1;
    }

    Ok((info, pos))
}

/// Value width in bytes for the fixed-size data field codes.
fn fixed_width(data_field: u8) -> usize {
    match data_field {
        0x01 | 0x09 => 1,
        0x02 | 0x0A => 2,
        0x03 | 0x0B => 3,
        0x04 | 0x05 | 0x0C => 4,
        0x06 | 0x0E => 6,
        0x07 => 8,
        _ => 0,
    }
}

fn decode_lvar(buffer: &[u8], offset: usize) -> Result<(DataValue, usize), MBusError> {
    let selector = byte_at(buffer, offset)?;
    let pos = offset + 1;

    match selector {
        0x00..=0xBF => {
            let len = selector as usize;
            let text = take_bytes(buffer, pos, len)?;
            Ok((DataValue::String(decode_text(text)), pos + len))
        }
        0xC0..=0xC9 | 0xD0..=0xD9 => {
            let len = (selector & 0x0F) as usize + 1;
            let bcd = decode_bcd(take_bytes(buffer, pos, len)?)?;
            let bcd = if selector >= 0xD0 { bcd.negate() } else { bcd };
            Ok((DataValue::Bcd(bcd), pos + len))
        }
        _ => Err(MBusError::UnsupportedEncoding(format!(
            "LVAR selector 0x{selector:02X} at offset {offset}"
        ))),
    }
}

fn decode_value(
    buffer: &[u8],
    offset: usize,
    data_field: u8,
    vi: &ValueInformation,
) -> Result<(DataValue, usize), MBusError> {
    if data_field == 0x0D {
        return decode_lvar(buffer, offset);
    }

    let width = fixed_width(data_field);
    let bytes = take_bytes(buffer, offset, width)?;
    let next = offset + width;

    if width == 0 {
        // 0x00 no data, 0x08 selection for readout
        return Ok((DataValue::None, next));
    }
    if vi.manufacturer_specific {
        return Ok((DataValue::Bytes(bytes.to_vec()), next));
    }

    let value = match data_field {
        0x02 | 0x03 | 0x04 | 0x06 if vi.description.is_time_point() => {
            DataValue::Date(MBusDateTime::decode(bytes)?)
        }
        0x05 => DataValue::Double(decode_real(bytes)?),
        0x09..=0x0E => DataValue::Bcd(decode_bcd(bytes)?),
        _ => DataValue::Long(decode_int(bytes)?),
    };

    Ok((value, next))
}

impl DataRecord {
    /// An empty record, to be filled by [`DataRecord::decode`].
    pub fn new() -> Self {
        DataRecord {
            dib: Vec::new(),
            vib: Vec::new(),
            function_field: FunctionField::Instantaneous,
            storage_number: 0,
            tariff: 0,
            subunit: 0,
            description: Description::NotSupported,
            user_defined_description: None,
            unit: None,
            exponent: None,
            modifiers: Vec::new(),
            value: DataValue::None,
        }
    }

    /// Decodes the record starting at `offset` and returns the number of bytes
    /// consumed. On error the record is left untouched.
    pub fn decode(&mut self, buffer: &[u8], offset: usize) -> Result<usize, MBusError> {
        let (di, pos) = parse_dib(buffer, offset)?;
        let (vi, pos) = parse_vib(buffer, pos)?;
        let (value, end) = decode_value(buffer, pos, di.data_field, &vi)?;

        *self = DataRecord {
            dib: di.dib,
            vib: vi.vib,
            function_field: di.function_field,
            storage_number: di.storage_number,
            tariff: di.tariff,
            subunit: di.subunit,
            description: vi.description,
            user_defined_description: vi.user_defined_description,
            unit: vi.unit,
            exponent: vi.exponent,
            modifiers: vi.modifiers,
            value,
        };

        Ok(end - offset)
    }

    /// Decodes a fresh record at `offset`, returning it with the bytes consumed.
    pub fn decode_from(buffer: &[u8], offset: usize) -> Result<(Self, usize), MBusError> {
        let mut record = DataRecord::new();
        let consumed = record.decode(buffer, offset)?;
        Ok((record, consumed))
    }

    pub fn dib(&self) -> &[u8] {
        &self.dib
    }

    pub fn vib(&self) -> &[u8] {
        &self.vib
    }

    pub fn function_field(&self) -> FunctionField {
        self.function_field
    }

    pub fn storage_number(&self) -> u64 {
        self.storage_number
    }

    pub fn tariff(&self) -> u32 {
        self.tariff
    }

    pub fn subunit(&self) -> u32 {
        self.subunit
    }

    pub fn description(&self) -> Description {
        self.description
    }

    /// Unit text of a plain-text VIF.
    pub fn user_defined_description(&self) -> Option<&str> {
        self.user_defined_description.as_deref()
    }

    pub fn unit(&self) -> Option<DlmsUnit> {
        self.unit
    }

    /// Base-10 exponent to apply to the value, `0` when scaling does not apply.
    pub fn multiplier_exponent(&self) -> i32 {
        self.exponent.unwrap_or(0)
    }

    /// Base-10 exponent, `None` when scaling is meaningless for the value.
    pub fn scaler(&self) -> Option<i32> {
        self.exponent
    }

    pub fn modifiers(&self) -> &[VifModifier] {
        &self.modifiers
    }

    pub fn data_value_type(&self) -> DataValueType {
        self.value.value_type()
    }

    pub fn data_value(&self) -> &DataValue {
        &self.value
    }

    /// Numeric value with the exponent applied.
    pub fn scaled_value(&self) -> Option<f64> {
        let raw = self.value.as_f64()?;
        Some(raw * 10f64.powi(self.multiplier_exponent()))
    }
}

impl fmt::Display for DataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DIB:{}, VIB:{} -> descr:{}",
            format_hex_compact(&self.dib),
            format_hex_compact(&self.vib),
            self.description
        )?;
        if let Some(text) = &self.user_defined_description {
            write!(f, " ({text})")?;
        }
        write!(f, ", function:{}", self.function_field)?;
        if self.storage_number > 0 {
            write!(f, ", storage:{}", self.storage_number)?;
        }
        if self.tariff > 0 {
            write!(f, ", tariff:{}", self.tariff)?;
        }
        if self.subunit > 0 {
            write!(f, ", subunit:{}", self.subunit)?;
        }
        write!(f, ", value:{}", self.value)?;
        if let Some(unit) = self.unit {
            write!(f, ", unit:{unit}")?;
        }
        if let Some(e) = self.exponent.filter(|e| *e != 0) {
            write!(f, ", scaled by 10^{e}")?;
        }
        Ok(())
    }
}
