//! Hardware knob capability descriptor (spec §4.3): latch-free, but reports
//! whether a fed sample actually changed the bound so the owning Domain can
//! emit a capabilities-changed notification. Grounded on
//! `domains/capabilities/knob_capabilities.hpp`.

use std::collections::HashMap;

use super::{CapabilitiesIf, CapabilitiesValuesMap};

/// The hardware control a knob capability describes. The source's
/// `KnobType` enum is per-platform; this crate exposes the subset the
/// budgeting/control modules target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnobType {
    Rapl,
    Prochot,
    TurboRatioLimit,
}

impl KnobType {
    pub fn name(&self) -> &'static str {
        match self {
            KnobType::Rapl => "Rapl",
            KnobType::Prochot => "Prochot",
            KnobType::TurboRatioLimit => "TurboRatioLimit",
        }
    }
}

pub struct KnobCapabilities {
    knob_type: KnobType,
    min: f64,
    max: f64,
}

impl KnobCapabilities {
    /// Reading-fed variant: starts at `NaN` until the first sample arrives.
    pub fn new(knob_type: KnobType) -> Self {
        Self {
            knob_type,
            min: f64::NAN,
            max: f64::NAN,
        }
    }

    /// Fixed-bounds variant (the source's two-`double` constructor), for
    /// knobs with no backing reading.
    pub fn fixed(knob_type: KnobType, min: f64, max: f64) -> Self {
        Self { knob_type, min, max }
    }

    /// Returns `true` iff the sample is finite and differs from the current
    /// bound — the source's trigger condition for
    /// `capabilitiesChangeCallback()`.
    pub fn update_min_reading(&mut self, value: f64) -> bool {
        if !value.is_nan() && value != self.min {
            self.min = value;
            true
        } else {
            false
        }
    }

    pub fn update_max_reading(&mut self, value: f64) -> bool {
        if !value.is_nan() && value != self.max {
            self.max = value;
            true
        } else {
            false
        }
    }

    pub fn knob_type(&self) -> KnobType {
        self.knob_type
    }
}

impl CapabilitiesIf for KnobCapabilities {
    fn name(&self) -> String {
        self.knob_type.name().to_string()
    }

    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }

    fn values_map(&self) -> CapabilitiesValuesMap {
        let mut map = HashMap::new();
        map.insert("Min".to_string(), self.min());
        map.insert("Max".to_string(), self.max());
        map
    }
}
