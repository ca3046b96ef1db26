//! The payload module contains the components responsible for decoding the
//! application layer of the M-Bus protocol: value codecs, the VIF catalog,
//! single data records and the variable data structure.

pub mod data_encoding;
pub mod record;
pub mod variable_data;
pub mod vif;
pub mod vif_maps;

pub use data_encoding::{Bcd, DateTimeKind, MBusDateTime};
pub use record::{DataRecord, DataValue, DataValueType, FunctionField};
pub use variable_data::{
    DataHeader, DeviceType, SecondaryAddress, StatusFlags, VariableDataStructure,
};
pub use vif::{ValueInformation, VifModifier};
pub use vif_maps::{Description, DlmsUnit};
