//! Reading-sourced min/max bounds with user-override latching (spec §4.3).
//!
//! Three flavors, from plainest to richest: [`ComponentCapabilities`] (no
//! latch, no config), [`KnobCapabilities`] (change-detecting, no latch, no
//! config), [`DomainCapabilities`] (latched, user-overridable, persisted to
//! [`crate::config`]). Grounded on `domains/capabilities/*.hpp`.

pub mod bounds;
pub mod component;
pub mod domain;
pub mod knob;

pub use bounds::LatchProperty;
pub use component::ComponentCapabilities;
pub use domain::DomainCapabilities;
pub use knob::{KnobCapabilities, KnobType};

use std::collections::HashMap;

/// `kUnknownMaxPowerLimitInWatts` — the sentinel max bound before any
/// reading has arrived.
pub const UNKNOWN_MAX_POWER_LIMIT_WATTS: f64 = 0x7fff as f64;

pub type CapabilitiesValuesMap = HashMap<String, f64>;

/// Common surface every capability flavor exposes over the RPC object tree
/// (spec §6's `Capabilities` interface).
pub trait CapabilitiesIf: Send {
    fn name(&self) -> String;
    fn min(&self) -> f64;
    fn max(&self) -> f64;
    fn values_map(&self) -> CapabilitiesValuesMap;
}
