//! Domain-level capability bounds: latched max/min with user-override
//! locking, config-backed persistence, and the hardcoded correction-time
//! and stat-reporting-period limits every domain reports over the RPC
//! surface (spec §4.3). Grounded on
//! `domains/capabilities/domain_capabilities.hpp`.

use std::collections::HashMap;

use crate::config::{PowerRangeStore, NO_OVERWRITTEN_VALUE};
use crate::domain::DomainId;

use super::bounds::LatchProperty;
use super::{CapabilitiesIf, CapabilitiesValuesMap, UNKNOWN_MAX_POWER_LIMIT_WATTS};

/// `getMaxCorrectionTimeInMs` — fixed regardless of domain (DESIGN.md).
pub const MAX_CORRECTION_TIME_MS: u32 = 60_000;
pub const MAX_STAT_REPORTING_PERIOD_S: u16 = 3_600;
pub const MIN_STAT_REPORTING_PERIOD_S: u16 = 1;

pub struct DomainCapabilities {
    max_rated: LatchProperty<f64>,
    max: LatchProperty<f64>,
    min: LatchProperty<f64>,
    min_correction_time_ms: u32,
    has_min_reading: bool,
    has_max_reading: bool,
    last_min: f64,
    last_max: f64,
    domain_id: DomainId,
    store: Box<dyn PowerRangeStore>,
}

impl DomainCapabilities {
    pub fn new(
        has_min_reading: bool,
        has_max_reading: bool,
        min_correction_time_ms: u32,
        domain_id: DomainId,
        store: Box<dyn PowerRangeStore>,
    ) -> Self {
        let mut caps = Self {
            max_rated: LatchProperty::new(UNKNOWN_MAX_POWER_LIMIT_WATTS),
            max: LatchProperty::new(UNKNOWN_MAX_POWER_LIMIT_WATTS),
            min: LatchProperty::new(0.0),
            min_correction_time_ms,
            has_min_reading,
            has_max_reading,
            last_min: 0.0,
            last_max: 0.0,
            domain_id,
            store,
        };
        caps.read_config();
        caps
    }

    /// Source's min reading-event callback: updates the latch (no-op if
    /// user-locked), notifies on an actual bound change.
    pub fn update_min_reading(&mut self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        let previous = self.min.get();
        self.last_min = value;
        self.min.set(value);
        self.min.get() != previous
    }

    /// Source's max reading-event callback: also refreshes `maxRated`,
    /// since the reading IS the rated max absent a user override.
    pub fn update_max_reading(&mut self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        let previous = self.max.get();
        self.last_max = value;
        self.max.set(value);
        self.max_rated.set(value);
        self.max.get() != previous
    }

    pub fn max_rated(&self) -> f64 {
        self.max_rated.get()
    }

    /// `setMax`: `0` with a backing reading means "clear the override and
    /// follow the reading again"; any other value locks the bound and
    /// persists it to config.
    pub fn set_max(&mut self, value: f64) -> bool {
        let previous = self.max.get();
        if value == 0.0 && self.has_max_reading {
            self.max.set_and_unlock(self.last_max);
            self.update_config_max(NO_OVERWRITTEN_VALUE);
        } else {
            self.max.set_and_lock(value);
            self.update_config_max(value);
        }
        self.max.get() != previous
    }

    pub fn set_min(&mut self, value: f64) -> bool {
        let previous = self.min.get();
        if value == 0.0 && self.has_min_reading {
            self.min.set_and_unlock(self.last_min);
            self.update_config_min(NO_OVERWRITTEN_VALUE);
        } else {
            self.min.set_and_lock(value);
            self.update_config_min(value);
        }
        self.min.get() != previous
    }

    pub fn max_correction_time_ms(&self) -> u32 {
        MAX_CORRECTION_TIME_MS
    }

    pub fn min_correction_time_ms(&self) -> u32 {
        self.min_correction_time_ms
    }

    pub fn max_stat_reporting_period(&self) -> u16 {
        MAX_STAT_REPORTING_PERIOD_S
    }

    pub fn min_stat_reporting_period(&self) -> u16 {
        MIN_STAT_REPORTING_PERIOD_S
    }

    fn update_config_min(&mut self, value: f64) {
        let mut range = self.store.get_power_range();
        match self.domain_id {
            DomainId::AcTotalPower => range.ac_min = value,
            DomainId::CpuSubsystem => range.cpu_min = value,
            DomainId::MemorySubsystem => range.memory_min = value,
            DomainId::Pcie => range.pcie_min = value,
            DomainId::DcTotalPower => range.dc_min = value,
            DomainId::HwProtection | DomainId::Performance => return,
        }
        self.store.update_power_range(range);
    }

    fn update_config_max(&mut self, value: f64) {
        let mut range = self.store.get_power_range();
        match self.domain_id {
            DomainId::AcTotalPower => range.ac_max = value,
            DomainId::CpuSubsystem => range.cpu_max = value,
            DomainId::MemorySubsystem => range.memory_max = value,
            DomainId::Pcie => range.pcie_max = value,
            DomainId::DcTotalPower => range.dc_max = value,
            DomainId::HwProtection | DomainId::Performance => return,
        }
        self.store.update_power_range(range);
    }

    fn read_config(&mut self) {
        let range = self.store.get_power_range();
        let (config_min, config_max) = match self.domain_id {
            DomainId::AcTotalPower => (range.ac_min, range.ac_max),
            DomainId::CpuSubsystem => (range.cpu_min, range.cpu_max),
            DomainId::MemorySubsystem => (range.memory_min, range.memory_max),
            DomainId::Pcie => (range.pcie_min, range.pcie_max),
            DomainId::DcTotalPower => (range.dc_min, range.dc_max),
            DomainId::HwProtection | DomainId::Performance => return,
        };
        if config_max > 0.0 {
            self.max.set_and_lock(config_max);
        }
        if config_min > 0.0 {
            self.min.set_and_lock(config_min);
        }
    }
}

impl CapabilitiesIf for DomainCapabilities {
    fn name(&self) -> String {
        "Domain".to_string()
    }

    fn min(&self) -> f64 {
        self.min.get()
    }

    fn max(&self) -> f64 {
        self.max.get()
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
    use crate::config::MemoryPowerRangeStore;

    fn caps(domain_id: DomainId) -> DomainCapabilities {
        DomainCapabilities::new(
            false,
            true,
            1_000,
            domain_id,
            Box::new(MemoryPowerRangeStore::default()),
        )
    }

    #[test]
    fn user_override_locks_against_further_readings() {
        let mut c = caps(DomainId::CpuSubsystem);
        c.update_max_reading(200.0);
        c.set_max(150.0);
        c.update_max_reading(500.0);
        assert_eq!(c.max(), 150.0);
    }

    #[test]
    fn zero_override_restores_last_reading() {
        let mut c = caps(DomainId::CpuSubsystem);
        c.update_max_reading(200.0);
        c.set_max(150.0);
        c.set_max(0.0);
        assert_eq!(c.max(), 200.0);
    }

    #[test]
    fn override_persists_through_config_store() {
        let mut store = MemoryPowerRangeStore::default();
        store.range.cpu_max = 0.0;
        let mut c = DomainCapabilities::new(
            false,
            true,
            1_000,
            DomainId::CpuSubsystem,
            Box::new(store),
        );
        c.set_max(180.0);
        assert_eq!(c.max(), 180.0);
    }

    #[test]
    fn hw_protection_ignores_config_persistence() {
        let mut c = caps(DomainId::HwProtection);
        c.set_max(42.0);
        assert_eq!(c.max(), 42.0);
    }

    #[test]
    fn correction_time_and_reporting_period_constants() {
        let c = caps(DomainId::CpuSubsystem);
        assert_eq!(c.max_correction_time_ms(), 60_000);
        assert_eq!(c.min_correction_time_ms(), 1_000);
        assert_eq!(c.max_stat_reporting_period(), 3_600);
        assert_eq!(c.min_stat_reporting_period(), 1);
    }
}
