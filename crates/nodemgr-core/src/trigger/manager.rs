//! Builds [`Trigger`]s and reports the min/max/unit capabilities of each
//! available trigger type (spec §4.2.5). Grounded on
//! `triggers/triggers_manager.hpp`.

use std::collections::{HashMap, HashSet};

use crate::error::PolicyError;
use crate::statistics::MovingAverage;

use super::action::{Action, ActionIf};
use super::binary::ActionBinary;
use super::cpu_utilization::ActionCpuUtilization;
use super::gpio::ActionGpio;
use super::{Trigger, TriggerCallback, TriggerType};

/// Strips the polarity bit a GPIO policy's `triggerLimit` encodes, leaving
/// the line index `reserveGpio`/`freeGpio` track (spec §3: "GPIO lines are a
/// process-wide reserved set").
pub fn gpio_line_of(trigger_limit: u16) -> u16 {
    trigger_limit & !GPIO_POLARITY_BIT
}

const CPU_UTILIZATION_CORRECTION_TIME_MS: i64 = 2_000;
/// High bit of a GPIO trigger's level encodes the edge polarity
/// (`triggerOnRisingEdge`), matching the source's `value & (1 << 15)`.
const GPIO_POLARITY_BIT: u16 = 1 << 15;

#[derive(Debug, Clone)]
pub struct TriggerCapabilities {
    pub trigger_type: TriggerType,
    pub name: &'static str,
    pub unit: &'static str,
    pub min: u16,
    pub max: u16,
}

pub struct TriggersManager {
    capabilities: HashMap<TriggerType, TriggerCapabilities>,
    reserved_gpio_lines: HashSet<u16>,
}

impl TriggersManager {
    pub fn new(gpio_lines_count: u16) -> Self {
        let mut capabilities = HashMap::new();
        for cap in [
            TriggerCapabilities {
                trigger_type: TriggerType::InletTemperature,
                name: "Inlet Temperature",
                unit: "Degree Celsius",
                min: 0,
                max: 100,
            },
            TriggerCapabilities {
                trigger_type: TriggerType::HostReset,
                name: "Host Reset",
                unit: "Boot(0)/HostReset(1)",
                min: 0,
                max: 0,
            },
            TriggerCapabilities {
                trigger_type: TriggerType::CpuUtilization,
                name: "C0 Residency",
                unit: "Percentage",
                min: 0,
                max: 100,
            },
            TriggerCapabilities {
                trigger_type: TriggerType::Always,
                name: "Always On",
                unit: "N/A",
                min: 0,
                max: 0,
            },
            TriggerCapabilities {
                trigger_type: TriggerType::SmbalertInterrupt,
                name: "SMBAlert",
                unit: "Interrupt(0)/Idle(1)",
                min: 0,
                max: 0,
            },
        ] {
            capabilities.insert(cap.trigger_type, cap);
        }

        if gpio_lines_count > 0 {
            capabilities.insert(
                TriggerType::Gpio,
                TriggerCapabilities {
                    trigger_type: TriggerType::Gpio,
                    name: "GPIO",
                    unit: "GpioIndex",
                    min: 0,
                    max: gpio_lines_count - 1,
                },
            );
        }

        Self { capabilities, reserved_gpio_lines: HashSet::new() }
    }

    pub fn is_trigger_available(&self, trigger_type: TriggerType) -> bool {
        self.capabilities.contains_key(&trigger_type)
    }

    /// Reserves GPIO `line` for a policy's exclusive use; fails if it's out
    /// of range or already held by another policy (spec §3's process-wide
    /// reserved set).
    pub fn reserve_gpio(&mut self, line: u16) -> Result<(), PolicyError> {
        let caps = self.get_trigger_capabilities(TriggerType::Gpio)?;
        if line < caps.min || line > caps.max {
            return Err(PolicyError::TriggerValueOutOfRange);
        }
        if !self.reserved_gpio_lines.insert(line) {
            return Err(PolicyError::OperationNotPermitted);
        }
        Ok(())
    }

    /// Releases a line reserved by [`Self::reserve_gpio`]. A no-op if it
    /// wasn't held, so callers can free unconditionally on delete.
    pub fn free_gpio(&mut self, line: u16) {
        self.reserved_gpio_lines.remove(&line);
    }

    pub fn get_trigger_capabilities(
        &self,
        trigger_type: TriggerType,
    ) -> Result<&TriggerCapabilities, PolicyError> {
        self.capabilities
            .get(&trigger_type)
            .ok_or(PolicyError::UnsupportedPolicyTriggerType)
    }

    pub fn create_trigger(
        &self,
        trigger_type: TriggerType,
        trigger_level: u16,
        callback: Option<TriggerCallback>,
    ) -> Result<Trigger, PolicyError> {
        let action = self.make_action(trigger_type, trigger_level)?;
        Ok(Trigger::new(action, callback))
    }

    fn make_action(
        &self,
        trigger_type: TriggerType,
        value: u16,
    ) -> Result<Box<dyn ActionIf>, PolicyError> {
        match trigger_type {
            TriggerType::InletTemperature => Ok(Box::new(Action::new(value as f64))),
            TriggerType::Gpio => {
                let trigger_on_rising_edge = value & GPIO_POLARITY_BIT != 0;
                Ok(Box::new(ActionGpio::new(trigger_on_rising_edge)))
            }
            TriggerType::CpuUtilization => Ok(Box::new(ActionCpuUtilization::new(
                value as f64,
                Box::new(MovingAverage::new(CPU_UTILIZATION_CORRECTION_TIME_MS)),
            ))),
            TriggerType::HostReset | TriggerType::SmbalertInterrupt => {
                Ok(Box::new(ActionBinary::new(value as f64)))
            }
            TriggerType::Always
            | TriggerType::MissingReadingsTimeout
            | TriggerType::TimeAfterHostReset => Err(PolicyError::UnsupportedPolicyTriggerType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpio_capability_absent_without_lines() {
        let manager = TriggersManager::new(0);
        assert!(!manager.is_trigger_available(TriggerType::Gpio));
    }

    #[test]
    fn gpio_capability_present_with_lines() {
        let manager = TriggersManager::new(8);
        let caps = manager.get_trigger_capabilities(TriggerType::Gpio).unwrap();
        assert_eq!(caps.max, 7);
    }

    #[test]
    fn always_trigger_type_cannot_be_created() {
        let manager = TriggersManager::new(0);
        assert!(manager.create_trigger(TriggerType::Always, 0, None).is_err());
    }

    #[test]
    fn reserving_an_already_held_line_fails() {
        let mut manager = TriggersManager::new(8);
        manager.reserve_gpio(3).unwrap();
        assert!(manager.reserve_gpio(3).is_err());
    }

    #[test]
    fn freeing_a_line_allows_it_to_be_reserved_again() {
        let mut manager = TriggersManager::new(8);
        manager.reserve_gpio(3).unwrap();
        manager.free_gpio(3);
        assert!(manager.reserve_gpio(3).is_ok());
    }

    #[test]
    fn reserving_an_out_of_range_line_fails() {
        let mut manager = TriggersManager::new(8);
        assert!(manager.reserve_gpio(8).is_err());
    }

    #[test]
    fn gpio_line_of_strips_the_polarity_bit() {
        assert_eq!(gpio_line_of(3 | GPIO_POLARITY_BIT), 3);
        assert_eq!(gpio_line_of(3), 3);
    }
}
