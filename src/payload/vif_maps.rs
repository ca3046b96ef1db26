//! VIF/VIFE Catalog Tables and Lookup Functions
//!
//! This module maps M-Bus Value Information Field codes to a physical unit,
//! a semantic description and a decimal scale exponent, as defined in
//! EN 13757-3. Three tables exist: the primary VIF table, the main extension
//! table reached through VIF 0xFD and the alternate extension table reached
//! through VIF 0xFB.
//!
//! Each table is a list of matching rules (`code & mask == pattern`); the first
//! rule that matches wins. A 128-slot index per table is built once on first use.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::fmt;

/// Semantic meaning of a data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Description {
    Energy,
    Volume,
    Mass,
    OnTime,
    OperatingTime,
    Power,
    VolumeFlow,
    VolumeFlowExt,
    MassFlow,
    FlowTemperature,
    ReturnTemperature,
    TemperatureDifference,
    ExternalTemperature,
    Pressure,
    Date,
    DateTime,
    Hca,
    AveragingDuration,
    ActualityDuration,
    FabricationNo,
    ExtendedIdentification,
    Address,
    Credit,
    Debit,
    AccessNumber,
    Medium,
    Manufacturer,
    ParameterSetId,
    ModelVersion,
    HardwareVersion,
    FirmwareVersion,
    OtherSoftwareVersion,
    CustomerLocation,
    Customer,
    AccessCodeUser,
    AccessCodeOperator,
    AccessCodeSystemOperator,
    AccessCodeDeveloper,
    Password,
    ErrorFlags,
    ErrorMask,
    SecurityKey,
    DigitalOutput,
    DigitalInput,
    Baudrate,
    ResponseDelayTime,
    Retry,
    RemoteControl,
    FirstStorageNumberCyclic,
    LastStorageNumberCyclic,
    SizeStorageBlock,
    StorageInterval,
    OperatorSpecificData,
    TimePoint,
    DurationLastReadout,
    TariffStart,
    TariffDuration,
    TariffPeriod,
    Dimensionless,
    Voltage,
    Current,
    ResetCounter,
    CumulationCounter,
    ControlSignal,
    DayOfWeek,
    WeekNumber,
    TimePointDayChange,
    ParameterActivationState,
    SpecialSupplierInformation,
    LastCumulationDuration,
    OperatingTimeBattery,
    BatteryChangeDateTime,
    RfLevel,
    RemainingBatteryLifeTime,
    ReactiveEnergy,
    RelativeHumidity,
    Phase,
    Frequency,
    TemperatureLimit,
    MaxPower,
    UserDefined,
    ManufacturerSpecific,
    NotSupported,
}

impl Description {
    /// Whether a record with this description carries a time point when the
    /// data field has a date/time width.
    pub fn is_time_point(&self) -> bool {
        matches!(
            self,
            Description::Date
                | Description::DateTime
                | Description::TariffStart
                | Description::BatteryChangeDateTime
        )
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Physical units, named after the DLMS/COSEM unit list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlmsUnit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Degree,
    DegreeCelsius,
    Currency,
    CubicMetre,
    CubicMetrePerHour,
    CubicMetrePerMinute,
    CubicMetrePerSecond,
    Kilogram,
    KilogramPerHour,
    Bar,
    Joule,
    JoulePerHour,
    Watt,
    WattHour,
    VarHour,
    Ampere,
    Volt,
    Hertz,
    Kelvin,
    Percentage,
    SignalStrength,
}

impl DlmsUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            DlmsUnit::Year => "a",
            DlmsUnit::Month => "mo",
            DlmsUnit::Day => "d",
            DlmsUnit::Hour => "h",
            DlmsUnit::Minute => "min",
            DlmsUnit::Second => "s",
            DlmsUnit::Degree => "°",
            DlmsUnit::DegreeCelsius => "°C",
            DlmsUnit::Currency => "currency",
            DlmsUnit::CubicMetre => "m³",
            DlmsUnit::CubicMetrePerHour => "m³/h",
            DlmsUnit::CubicMetrePerMinute => "m³/min",
            DlmsUnit::CubicMetrePerSecond => "m³/s",
            DlmsUnit::Kilogram => "kg",
            DlmsUnit::KilogramPerHour => "kg/h",
            DlmsUnit::Bar => "bar",
            DlmsUnit::Joule => "J",
            DlmsUnit::JoulePerHour => "J/h",
            DlmsUnit::Watt => "W",
            DlmsUnit::WattHour => "Wh",
            DlmsUnit::VarHour => "varh",
            DlmsUnit::Ampere => "A",
            DlmsUnit::Volt => "V",
            DlmsUnit::Hertz => "Hz",
            DlmsUnit::Kelvin => "K",
            DlmsUnit::Percentage => "%",
            DlmsUnit::SignalStrength => "dBm",
        }
    }
}

impl fmt::Display for DlmsUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// How the unit of a catalog entry is derived from the matched code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRule {
    /// No physical unit (identifiers, dates, counters).
    None,
    Fixed(DlmsUnit),
    /// Low two bits select seconds, minutes, hours or days.
    Duration,
    /// Low two bits select hours, days, months or years.
    LongDuration,
}

/// How the base-10 exponent of a catalog entry is derived from the matched code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleRule {
    /// Scaling is meaningless for the value (time points).
    NotApplicable,
    Fixed(i32),
    /// `exponent = (code & mask) + offset`
    Bits { mask: u8, offset: i32 },
}

/// One matching rule of a catalog table.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub mask: u8,
    pub pattern: u8,
    pub description: Description,
    pub unit: UnitRule,
    pub scale: ScaleRule,
}

/// Result of resolving a code against a [`CatalogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogMatch {
    pub description: Description,
    pub unit: Option<DlmsUnit>,
    pub exponent: Option<i32>,
}

impl CatalogEntry {
    pub fn matches(&self, code: u8) -> bool {
        code & self.mask == self.pattern
    }

    pub fn resolve(&self, code: u8) -> CatalogMatch {
        let unit = match self.unit {
            UnitRule::None => None,
            UnitRule::Fixed(unit) => Some(unit),
            UnitRule::Duration => Some(match code & 0x03 {
                0 => DlmsUnit::Second,
                1 => DlmsUnit::Minute,
                2 => DlmsUnit::Hour,
                _ => DlmsUnit::Day,
            }),
            UnitRule::LongDuration => Some(match code & 0x03 {
                0 => DlmsUnit::Hour,
                1 => DlmsUnit::Day,
                2 => DlmsUnit::Month,
                _ => DlmsUnit::Year,
            }),
        };
        let exponent = match self.scale {
            ScaleRule::NotApplicable => None,
            ScaleRule::Fixed(e) => Some(e),
            ScaleRule::Bits { mask, offset } => Some((code & mask) as i32 + offset),
        };
        CatalogMatch {
            description: self.description,
            unit,
            exponent,
        }
    }
}

const fn entry(
    mask: u8,
    pattern: u8,
    description: Description,
    unit: UnitRule,
    scale: ScaleRule,
) -> CatalogEntry {
    CatalogEntry {
        mask,
        pattern,
        description,
        unit,
        scale,
    }
}

const fn bits(mask: u8, offset: i32) -> ScaleRule {
    ScaleRule::Bits { mask, offset }
}

use Description as D;
use DlmsUnit as U;
use UnitRule::{Duration, Fixed, LongDuration};

const NONE: UnitRule = UnitRule::None;
const ZERO: ScaleRule = ScaleRule::Fixed(0);
const NA: ScaleRule = ScaleRule::NotApplicable;

/// Primary VIF codes (extension bit stripped).
pub static PRIMARY_VIF_TABLE: &[CatalogEntry] = &[
    entry(0x78, 0x00, D::Energy, Fixed(U::WattHour), bits(0x07, -3)),
    entry(0x78, 0x08, D::Energy, Fixed(U::Joule), bits(0x07, 0)),
    entry(0x78, 0x10, D::Volume, Fixed(U::CubicMetre), bits(0x07, -6)),
    entry(0x78, 0x18, D::Mass, Fixed(U::Kilogram), bits(0x07, -3)),
    entry(0x7C, 0x20, D::OnTime, Duration, ZERO),
    entry(0x7C, 0x24, D::OperatingTime, Duration, ZERO),
    entry(0x78, 0x28, D::Power, Fixed(U::Watt), bits(0x07, -3)),
    entry(0x78, 0x30, D::Power, Fixed(U::JoulePerHour), bits(0x07, 0)),
    entry(0x78, 0x38, D::VolumeFlow, Fixed(U::CubicMetrePerHour), bits(0x07, -6)),
    entry(0x78, 0x40, D::VolumeFlowExt, Fixed(U::CubicMetrePerMinute), bits(0x07, -7)),
    entry(0x78, 0x48, D::VolumeFlowExt, Fixed(U::CubicMetrePerSecond), bits(0x07, -9)),
    entry(0x78, 0x50, D::MassFlow, Fixed(U::KilogramPerHour), bits(0x07, -3)),
    entry(0x7C, 0x58, D::FlowTemperature, Fixed(U::DegreeCelsius), bits(0x03, -3)),
    entry(0x7C, 0x5C, D::ReturnTemperature, Fixed(U::DegreeCelsius), bits(0x03, -3)),
    entry(0x7C, 0x60, D::TemperatureDifference, Fixed(U::Kelvin), bits(0x03, -3)),
    entry(0x7C, 0x64, D::ExternalTemperature, Fixed(U::DegreeCelsius), bits(0x03, -3)),
    entry(0x7C, 0x68, D::Pressure, Fixed(U::Bar), bits(0x03, -3)),
    entry(0x7F, 0x6C, D::Date, NONE, NA),
    entry(0x7F, 0x6D, D::DateTime, NONE, NA),
    entry(0x7F, 0x6E, D::Hca, NONE, ZERO),
    entry(0x7C, 0x70, D::AveragingDuration, Duration, ZERO),
    entry(0x7C, 0x74, D::ActualityDuration, Duration, ZERO),
    entry(0x7F, 0x78, D::FabricationNo, NONE, ZERO),
    entry(0x7F, 0x79, D::ExtendedIdentification, NONE, ZERO),
    entry(0x7F, 0x7A, D::Address, NONE, ZERO),
];

/// Main extension table, codes following VIF 0xFD.
pub static MAIN_EXTENDED_VIF_TABLE: &[CatalogEntry] = &[
    entry(0x7C, 0x00, D::Credit, Fixed(U::Currency), bits(0x03, -3)),
    entry(0x7C, 0x04, D::Debit, Fixed(U::Currency), bits(0x03, -3)),
    entry(0x7F, 0x08, D::AccessNumber, NONE, ZERO),
    entry(0x7F, 0x09, D::Medium, NONE, ZERO),
    entry(0x7F, 0x0A, D::Manufacturer, NONE, ZERO),
    entry(0x7F, 0x0B, D::ParameterSetId, NONE, ZERO),
    entry(0x7F, 0x0C, D::ModelVersion, NONE, ZERO),
    entry(0x7F, 0x0D, D::HardwareVersion, NONE, ZERO),
    entry(0x7F, 0x0E, D::FirmwareVersion, NONE, ZERO),
    entry(0x7F, 0x0F, D::OtherSoftwareVersion, NONE, ZERO),
    entry(0x7F, 0x10, D::CustomerLocation, NONE, ZERO),
    entry(0x7F, 0x11, D::Customer, NONE, ZERO),
    entry(0x7F, 0x12, D::AccessCodeUser, NONE, ZERO),
    entry(0x7F, 0x13, D::AccessCodeOperator, NONE, ZERO),
    entry(0x7F, 0x14, D::AccessCodeSystemOperator, NONE, ZERO),
    entry(0x7F, 0x15, D::AccessCodeDeveloper, NONE, ZERO),
    entry(0x7F, 0x16, D::Password, NONE, ZERO),
    entry(0x7F, 0x17, D::ErrorFlags, NONE, ZERO),
    entry(0x7F, 0x18, D::ErrorMask, NONE, ZERO),
    entry(0x7F, 0x19, D::SecurityKey, NONE, ZERO),
    entry(0x7F, 0x1A, D::DigitalOutput, NONE, ZERO),
    entry(0x7F, 0x1B, D::DigitalInput, NONE, ZERO),
    entry(0x7F, 0x1C, D::Baudrate, NONE, ZERO),
    entry(0x7F, 0x1D, D::ResponseDelayTime, NONE, ZERO),
    entry(0x7F, 0x1E, D::Retry, NONE, ZERO),
    entry(0x7F, 0x1F, D::RemoteControl, NONE, ZERO),
    entry(0x7F, 0x20, D::FirstStorageNumberCyclic, NONE, ZERO),
    entry(0x7F, 0x21, D::LastStorageNumberCyclic, NONE, ZERO),
    entry(0x7F, 0x22, D::SizeStorageBlock, NONE, ZERO),
    entry(0x7C, 0x24, D::StorageInterval, Duration, ZERO),
    entry(0x7F, 0x28, D::StorageInterval, Fixed(U::Month), ZERO),
    entry(0x7F, 0x29, D::StorageInterval, Fixed(U::Year), ZERO),
    entry(0x7F, 0x2A, D::OperatorSpecificData, NONE, ZERO),
    entry(0x7F, 0x2B, D::TimePoint, Fixed(U::Second), ZERO),
    entry(0x7C, 0x2C, D::DurationLastReadout, Duration, ZERO),
    entry(0x7F, 0x30, D::TariffStart, NONE, NA),
    entry(0x7C, 0x30, D::TariffDuration, Duration, ZERO),
    entry(0x7C, 0x34, D::TariffPeriod, Duration, ZERO),
    entry(0x7F, 0x38, D::TariffPeriod, Fixed(U::Month), ZERO),
    entry(0x7F, 0x39, D::TariffPeriod, Fixed(U::Year), ZERO),
    entry(0x7F, 0x3A, D::Dimensionless, NONE, ZERO),
    entry(0x70, 0x40, D::Voltage, Fixed(U::Volt), bits(0x0F, -9)),
    entry(0x70, 0x50, D::Current, Fixed(U::Ampere), bits(0x0F, -12)),
    entry(0x7F, 0x60, D::ResetCounter, NONE, ZERO),
    entry(0x7F, 0x61, D::CumulationCounter, NONE, ZERO),
    entry(0x7F, 0x62, D::ControlSignal, NONE, ZERO),
    entry(0x7F, 0x63, D::DayOfWeek, NONE, ZERO),
    entry(0x7F, 0x64, D::WeekNumber, NONE, ZERO),
    entry(0x7F, 0x65, D::TimePointDayChange, NONE, ZERO),
    entry(0x7F, 0x66, D::ParameterActivationState, NONE, ZERO),
    entry(0x7F, 0x67, D::SpecialSupplierInformation, NONE, ZERO),
    entry(0x7C, 0x68, D::LastCumulationDuration, LongDuration, ZERO),
    entry(0x7C, 0x6C, D::OperatingTimeBattery, LongDuration, ZERO),
    entry(0x7F, 0x70, D::BatteryChangeDateTime, NONE, NA),
    entry(0x7F, 0x71, D::RfLevel, Fixed(U::SignalStrength), ZERO),
    entry(0x7F, 0x74, D::RemainingBatteryLifeTime, Fixed(U::Day), ZERO),
];

/// Alternate extension table, codes following VIF 0xFB.
pub static ALTERNATE_EXTENDED_VIF_TABLE: &[CatalogEntry] = &[
    // 10^(n-1) MWh
    entry(0x7E, 0x00, D::Energy, Fixed(U::WattHour), bits(0x01, 5)),
    // 10^n kVARh
    entry(0x7E, 0x02, D::ReactiveEnergy, Fixed(U::VarHour), bits(0x01, 3)),
    // 10^(n-1) GJ
    entry(0x7E, 0x08, D::Energy, Fixed(U::Joule), bits(0x01, 8)),
    // 10^(n+2) m³
    entry(0x7E, 0x10, D::Volume, Fixed(U::CubicMetre), bits(0x01, 2)),
    // 10^(n+2) t
    entry(0x7E, 0x18, D::Mass, Fixed(U::Kilogram), bits(0x01, 5)),
    entry(0x7E, 0x1A, D::RelativeHumidity, Fixed(U::Percentage), bits(0x01, -1)),
    // 10^(n-1) MW
    entry(0x7E, 0x28, D::Power, Fixed(U::Watt), bits(0x01, 5)),
    entry(0x7F, 0x2A, D::Phase, Fixed(U::Degree), ScaleRule::Fixed(-1)),
    entry(0x7F, 0x2B, D::Phase, Fixed(U::Degree), ScaleRule::Fixed(-1)),
    entry(0x7C, 0x2C, D::Frequency, Fixed(U::Hertz), bits(0x03, -3)),
    // 10^(n-1) GJ/h
    entry(0x7E, 0x30, D::Power, Fixed(U::JoulePerHour), bits(0x01, 8)),
    entry(0x7C, 0x74, D::TemperatureLimit, Fixed(U::DegreeCelsius), bits(0x03, -3)),
    entry(0x78, 0x78, D::MaxPower, Fixed(U::Watt), bits(0x07, -3)),
];

type CatalogIndex = [Option<&'static CatalogEntry>; 128];

fn build_index(table: &'static [CatalogEntry]) -> CatalogIndex {
    let mut index: CatalogIndex = [None; 128];
    for (code, slot) in index.iter_mut().enumerate() {
        *slot = table.iter().find(|e| e.matches(code as u8));
    }
    index
}

static PRIMARY_INDEX: Lazy<CatalogIndex> = Lazy::new(|| build_index(PRIMARY_VIF_TABLE));
static MAIN_EXTENDED_INDEX: Lazy<CatalogIndex> =
    Lazy::new(|| build_index(MAIN_EXTENDED_VIF_TABLE));
static ALTERNATE_EXTENDED_INDEX: Lazy<CatalogIndex> =
    Lazy::new(|| build_index(ALTERNATE_EXTENDED_VIF_TABLE));

/// Looks up a primary VIF code. The extension bit is ignored.
pub fn lookup_primary_vif(code: u8) -> Option<CatalogMatch> {
    let code = code & 0x7F;
    PRIMARY_INDEX[code as usize].map(|e| e.resolve(code))
}

/// Looks up a code of the 0xFD extension table. The extension bit is ignored.
pub fn lookup_vife_fd(code: u8) -> Option<CatalogMatch> {
    let code = code & 0x7F;
    MAIN_EXTENDED_INDEX[code as usize].map(|e| e.resolve(code))
}

/// Looks up a code of the 0xFB extension table. The extension bit is ignored.
pub fn lookup_vife_fb(code: u8) -> Option<CatalogMatch> {
    let code = code & 0x7F;
    ALTERNATE_EXTENDED_INDEX[code as usize].map(|e| e.resolve(code))
}
