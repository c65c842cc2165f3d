//! `Control`'s hardware sink. Grounded on `efficiency_control.hpp`'s
//! `EfficiencyControlIf`: a thin `setValue`/`resetValue` adapter in front of
//! the devices manager's knob-write call, the same shape `Control` needs for
//! writing RAPL power limits.

use std::collections::HashMap;

use crate::capability::KnobType;
use crate::domain::RaplDomainId;
use crate::policy::COMPONENT_ID_ALL;

use super::{Control, Limit};

/// The devices-manager-facing side of a knob write: `set_value`/
/// `reset_value` for a given knob, device and raw hardware value.
pub trait KnobWriter: Send {
    fn set_value(&mut self, knob_type: KnobType, device_id: u8, value: f64);
    fn reset_value(&mut self, knob_type: KnobType, device_id: u8);
}

/// Reference `Control` used by tests and as the default wiring until a real
/// devices-manager knob writer is plugged in: tracks which `(RaplDomainId,
/// component)` currently carry an active limit and forwards every write to
/// the configured [`KnobWriter`].
pub struct InMemoryControl {
    writer: Box<dyn KnobWriter>,
    domain_limits: HashMap<RaplDomainId, Limit>,
    component_limits: HashMap<(RaplDomainId, u8), Limit>,
}

impl InMemoryControl {
    pub fn new(writer: Box<dyn KnobWriter>) -> Self {
        Self {
            writer,
            domain_limits: HashMap::new(),
            component_limits: HashMap::new(),
        }
    }
}

impl Control for InMemoryControl {
    fn set_budget(&mut self, rapl_domain_id: RaplDomainId, limit: Option<Limit>) {
        match limit {
            Some(limit) => {
                self.writer.set_value(KnobType::Rapl, COMPONENT_ID_ALL, limit.value);
                self.domain_limits.insert(rapl_domain_id, limit);
            }
            None => {
                self.writer.reset_value(KnobType::Rapl, COMPONENT_ID_ALL);
                self.domain_limits.remove(&rapl_domain_id);
            }
        }
    }

    fn set_component_budget(&mut self, rapl_domain_id: RaplDomainId, component_id: u8, limit: Option<Limit>) {
        match limit {
            Some(limit) => {
                self.writer.set_value(KnobType::Rapl, component_id, limit.value);
                self.component_limits.insert((rapl_domain_id, component_id), limit);
            }
            None => {
                self.writer.reset_value(KnobType::Rapl, component_id);
                self.component_limits.remove(&(rapl_domain_id, component_id));
            }
        }
    }

    fn is_domain_limit_active(&self, rapl_domain_id: RaplDomainId) -> bool {
        self.domain_limits.contains_key(&rapl_domain_id)
    }

    fn is_component_limit_active(&self, rapl_domain_id: RaplDomainId, component_id: u8) -> bool {
        self.component_limits.contains_key(&(rapl_domain_id, component_id))
    }
}

/// Default [`KnobWriter`] until a real devices-manager knob write is plugged
/// in: traces every write instead of touching hardware, the same
/// logging-adapter shape as `LoggingTransport`/`LoggingHostPowerControl`.
#[derive(Default)]
pub struct LoggingKnobWriter;

impl KnobWriter for LoggingKnobWriter {
    fn set_value(&mut self, knob_type: KnobType, device_id: u8, value: f64) {
        tracing::info!(knob = knob_type.name(), device_id, value, "set knob value");
    }

    fn reset_value(&mut self, knob_type: KnobType, device_id: u8) {
        tracing::info!(knob = knob_type.name(), device_id, "reset knob value");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingWriter {
        set: Vec<(KnobType, u8, f64)>,
        reset: Vec<(KnobType, u8)>,
    }

    impl KnobWriter for RecordingWriter {
        fn set_value(&mut self, knob_type: KnobType, device_id: u8, value: f64) {
            self.set.push((knob_type, device_id, value));
        }
        fn reset_value(&mut self, knob_type: KnobType, device_id: u8) {
            self.reset.push((knob_type, device_id));
        }
    }

    #[test]
    fn set_budget_tracks_active_state_and_forwards_write() {
        let mut control = InMemoryControl::new(Box::new(RecordingWriter::default()));
        assert!(!control.is_domain_limit_active(RaplDomainId::CpuSubsystem));

        control.set_budget(
            RaplDomainId::CpuSubsystem,
            Some(Limit { value: 100.0, strategy: crate::policy::BudgetingStrategy::NonAggressive }),
        );
        assert!(control.is_domain_limit_active(RaplDomainId::CpuSubsystem));

        control.set_budget(RaplDomainId::CpuSubsystem, None);
        assert!(!control.is_domain_limit_active(RaplDomainId::CpuSubsystem));
    }

    #[test]
    fn component_budget_is_tracked_independently_of_domain_budget() {
        let mut control = InMemoryControl::new(Box::new(RecordingWriter::default()));
        control.set_component_budget(
            RaplDomainId::Pcie,
            3,
            Some(Limit { value: 40.0, strategy: crate::policy::BudgetingStrategy::Aggressive }),
        );
        assert!(control.is_component_limit_active(RaplDomainId::Pcie, 3));
        assert!(!control.is_component_limit_active(RaplDomainId::Pcie, 4));
        assert!(!control.is_domain_limit_active(RaplDomainId::Pcie));
    }
}
