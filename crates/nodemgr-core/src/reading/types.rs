//! Channel identity and out-of-band events for the reading bus (spec §3, §4.1).

use serde::{Deserialize, Serialize};

/// A sensor/derived-value channel. Grounded on `reading_type.hpp`: the
/// concrete subset this spec's control loop consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadingType {
    CpuPower,
    DramPower,
    PciePower,
    AcPower,
    DcPower,
    InletTemperature,
    CpuUtilization,
    HostPower,
    CpuPresence,
    PciePresence,
    PlatformPowerEfficiency,
    PsuEfficiency,
    /// One reading per reserved GPIO line.
    Gpio(u16),
}

/// Device index within a reading channel. `ALL` (`kComponentIdAll`) is
/// `DeviceIndex::MAX`, matching the source's sentinel component id.
pub type DeviceIndex = u8;

pub const ALL_DEVICES: DeviceIndex = DeviceIndex::MAX;
pub const COMPONENT_ID_ALL: DeviceIndex = DeviceIndex::MAX;

/// Out-of-band events a reading may deliver alongside (or instead of) a
/// sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingEventKind {
    Available,
    Unavailable,
    SourceChanged,
}
