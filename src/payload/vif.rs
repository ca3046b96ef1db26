//! # Value Information Block
//!
//! Decodes the VIF byte and its VIFE chain into a description, a unit and a
//! scale exponent, consulting the catalog tables in [`super::vif_maps`].

use crate::constants::{
    MBUS_DIB_MAX_VIFE, MBUS_DIB_VIF_EXTENSION_BIT, MBUS_VIF_EXTENSION_FB, MBUS_VIF_EXTENSION_FD,
    MBUS_VIF_MANUFACTURER_SPECIFIC, MBUS_VIF_PLAIN_TEXT,
};
use crate::error::MBusError;
use crate::payload::data_encoding::{byte_at, decode_text, take_bytes};
use crate::payload::vif_maps::{
    lookup_primary_vif, lookup_vife_fb, lookup_vife_fd, CatalogMatch, Description, DlmsUnit,
};
use serde::Serialize;

/// A combinable VIFE following the VIF (or the extension table code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VifModifier {
    /// E00x xxxx: record error code reported by the meter.
    RecordError(u8),
    PerSecond,
    PerMinute,
    PerHour,
    PerDay,
    PerWeek,
    PerMonth,
    PerYear,
    PerRevolution,
    /// Increment per input pulse on the given channel.
    IncrementPerInputPulse(u8),
    /// Increment per output pulse on the given channel.
    IncrementPerOutputPulse(u8),
    PerLitre,
    PerCubicMetre,
    PerKilogram,
    PerKelvin,
    PerKilowattHour,
    PerGigajoule,
    PerKilowatt,
    PerKelvinLitre,
    PerVolt,
    PerAmpere,
    MultipliedBySecond,
    MultipliedBySecondPerVolt,
    MultipliedBySecondPerAmpere,
    StartDateTime,
    UncorrectedUnit,
    AccumulationIfPositive,
    AccumulationIfNegative,
    LowerLimit,
    UpperLimit,
    /// Multiplicative correction 10^n, already applied to the exponent.
    CorrectionFactor(i32),
    /// Additive correction constant 10^n of the unit.
    AdditiveCorrection(i32),
    FutureValue,
    /// Every following VIFE is manufacturer specific.
    ManufacturerSpecific,
    Raw(u8),
}

impl VifModifier {
    fn from_code(code: u8) -> Self {
        use VifModifier::*;
        match code & 0x7F {
            c @ 0x00..=0x1F => RecordError(c),
            0x20 => PerSecond,
            0x21 => PerMinute,
            0x22 => PerHour,
            0x23 => PerDay,
            0x24 => PerWeek,
            0x25 => PerMonth,
            0x26 => PerYear,
            0x27 => PerRevolution,
            c @ 0x28..=0x29 => IncrementPerInputPulse(c & 0x01),
            c @ 0x2A..=0x2B => IncrementPerOutputPulse(c & 0x01),
            0x2C => PerLitre,
            0x2D => PerCubicMetre,
            0x2E => PerKilogram,
            0x2F => PerKelvin,
            0x30 => PerKilowattHour,
            0x31 => PerGigajoule,
            0x32 => PerKilowatt,
            0x33 => PerKelvinLitre,
            0x34 => PerVolt,
            0x35 => PerAmpere,
            0x36 => MultipliedBySecond,
            0x37 => MultipliedBySecondPerVolt,
            0x38 => MultipliedBySecondPerAmpere,
            0x39 => StartDateTime,
            0x3A => UncorrectedUnit,
            0x3B => AccumulationIfPositive,
            0x3C => AccumulationIfNegative,
            0x40 => LowerLimit,
            0x48 => UpperLimit,
            c @ 0x70..=0x77 => CorrectionFactor((c & 0x07) as i32 - 6),
            c @ 0x78..=0x7B => AdditiveCorrection((c & 0x03) as i32 - 3),
            0x7D => CorrectionFactor(3),
            0x7E => FutureValue,
            0x7F => ManufacturerSpecific,
            c => Raw(c),
        }
    }
}

/// Decoded value information block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueInformation {
    /// Raw VIF and VIFE bytes as transmitted (plain-text unit excluded).
    pub vib: Vec<u8>,
    pub description: Description,
    pub unit: Option<DlmsUnit>,
    /// Base-10 exponent; `None` when scaling does not apply to the value.
    pub exponent: Option<i32>,
    pub user_defined_description: Option<String>,
    pub modifiers: Vec<VifModifier>,
    /// The value field carries manufacturer-specific raw bytes.
    pub manufacturer_specific: bool,
}

impl ValueInformation {
    fn from_match(vib: Vec<u8>, m: CatalogMatch) -> Self {
        ValueInformation {
            vib,
            description: m.description,
            unit: m.unit,
            exponent: m.exponent,
            user_defined_description: None,
            modifiers: Vec::new(),
            manufacturer_specific: false,
        }
    }

    fn unsupported(vib: Vec<u8>) -> Self {
        ValueInformation::from_match(
            vib,
            CatalogMatch {
                description: Description::NotSupported,
                unit: None,
                exponent: Some(0),
            },
        )
    }
}

struct VifeChain<'a> {
    buffer: &'a [u8],
    pos: usize,
    count: usize,
}

impl VifeChain<'_> {
    fn next(&mut self) -> Result<u8, MBusError> {
        if self.count == MBUS_DIB_MAX_VIFE {
            return Err(MBusError::MalformedHeader(format!(
                "more than {MBUS_DIB_MAX_VIFE} VIFE bytes at offset {}",
                self.pos
            )));
        }
        let b = byte_at(self.buffer, self.pos)?;
        self.pos += 1;
        self.count += 1;
        Ok(b)
    }
}

/// Decodes the VIB starting at `offset`. Returns the decoded information and
/// the offset of the first byte after it.
pub fn parse_vib(buffer: &[u8], offset: usize) -> Result<(ValueInformation, usize), MBusError> {
    let vif = byte_at(buffer, offset)?;
    let mut chain = VifeChain {
        buffer,
        pos: offset + 1,
        count: 0,
    };
    let mut vib = vec![vif];

    let (mut info, mut extended) = match vif {
        MBUS_VIF_EXTENSION_FD | MBUS_VIF_EXTENSION_FB => {
            let code = chain.next()?;
            vib.push(code);
            let found = if vif == MBUS_VIF_EXTENSION_FD {
                lookup_vife_fd(code)
            } else {
                lookup_vife_fb(code)
            };
            let info = match found {
                Some(m) => ValueInformation::from_match(vib, m),
                None => ValueInformation::unsupported(vib),
            };
            (info, code & MBUS_DIB_VIF_EXTENSION_BIT != 0)
        }
        0x7B | 0x7D => {
            return Err(MBusError::MalformedHeader(format!(
                "VIF 0x{vif:02X} selects an extension table without the extension bit"
            )))
        }
        _ if vif & 0x7F == MBUS_VIF_MANUFACTURER_SPECIFIC => {
            let mut info = ValueInformation::from_match(
                vib,
                CatalogMatch {
                    description: Description::ManufacturerSpecific,
                    unit: None,
                    exponent: None,
                },
            );
            info.manufacturer_specific = true;
            (info, vif & MBUS_DIB_VIF_EXTENSION_BIT != 0)
        }
        _ if vif & 0x7F == MBUS_VIF_PLAIN_TEXT => {
            let info = ValueInformation::from_match(
                vib,
                CatalogMatch {
                    description: Description::UserDefined,
                    unit: None,
                    exponent: Some(0),
                },
            );
            (info, vif & MBUS_DIB_VIF_EXTENSION_BIT != 0)
        }
        _ => {
            let info = match lookup_primary_vif(vif) {
                Some(m) => ValueInformation::from_match(vib, m),
                None => ValueInformation::unsupported(vib),
            };
            (info, vif & MBUS_DIB_VIF_EXTENSION_BIT != 0)
        }
    };

    let mut manufacturer_tail = info.manufacturer_specific;
    while extended {
        let code = chain.next()?;
        info.vib.push(code);
        extended = code & MBUS_DIB_VIF_EXTENSION_BIT != 0;

        if manufacturer_tail {
            info.modifiers.push(VifModifier::Raw(code & 0x7F));
            continue;
        }

        let modifier = VifModifier::from_code(code);
        match modifier {
            VifModifier::CorrectionFactor(delta) => {
                info.exponent = info.exponent.map(|e| e + delta);
            }
            VifModifier::ManufacturerSpecific => manufacturer_tail = true,
            _ => {}
        }
        info.modifiers.push(modifier);
    }

    let mut pos = chain.pos;
    if vif & 0x7F == MBUS_VIF_PLAIN_TEXT {
        let len = byte_at(buffer, pos)? as usize;
        let text = take_bytes(buffer, pos + 1, len)?;
        info.user_defined_description = Some(decode_text(text));
        pos += 1 + len;
    }

    Ok((info, pos))
}
