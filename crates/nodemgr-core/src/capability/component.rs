//! Per-component min/max bounds, fed straight from a reading with no
//! latching (spec §4.3). Grounded on
//! `domains/capabilities/component_capabilities.hpp`.

use std::collections::HashMap;

use crate::reading::DeviceIndex;

use super::{CapabilitiesIf, CapabilitiesValuesMap, UNKNOWN_MAX_POWER_LIMIT_WATTS};

pub struct ComponentCapabilities {
    component_id: DeviceIndex,
    min: f64,
    max: f64,
}

impl ComponentCapabilities {
    pub fn new(component_id: DeviceIndex) -> Self {
        Self {
            component_id,
            min: 0.0,
            max: UNKNOWN_MAX_POWER_LIMIT_WATTS,
        }
    }

    /// Mirrors the source's min reading-event callback: a `NaN` sample
    /// (reading unavailable) leaves the previous bound untouched.
    pub fn update_min_reading(&mut self, value: f64) {
        if !value.is_nan() {
            self.min = value;
        }
    }

    pub fn update_max_reading(&mut self, value: f64) {
        if !value.is_nan() {
            self.max = value;
        }
    }
}

impl CapabilitiesIf for ComponentCapabilities {
    fn name(&self) -> String {
        format!("Component_{}", self.component_id)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_reading_leaves_bound_unchanged() {
        let mut caps = ComponentCapabilities::new(2);
        caps.update_min_reading(5.0);
        caps.update_min_reading(f64::NAN);
        assert_eq!(caps.min(), 5.0);
    }

    #[test]
    fn name_includes_component_id() {
        let caps = ComponentCapabilities::new(3);
        assert_eq!(caps.name(), "Component_3");
    }
}
