//! Edge-detecting evaluators bound to a single reading value (spec §4.2).
//! Grounded on `actions/action.hpp`.

/// What a [`ActionIf::update_reading`] call detected, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerActionType {
    Trigger,
    Deactivate,
    MissingReading,
}

/// Every action sees the tick's timestamp alongside the reading, even
/// though only [`super::cpu_utilization::ActionCpuUtilization`]'s internal
/// averaging window actually needs it — a uniform signature lets
/// [`super::Trigger`] hold any action behind one trait object.
pub trait ActionIf: Send {
    fn update_reading(&mut self, now_ms: i64, new_reading: f64) -> Option<TriggerActionType>;
}

/// Threshold-crossing action: fires `Trigger` on an upward crossing of
/// `reference_value`, `Deactivate` on a downward crossing. `NaN` readings
/// are ignored rather than treated as a crossing.
pub struct Action {
    reference_value: f64,
    reading: f64,
}

impl Action {
    pub fn new(reference_value: f64) -> Self {
        Self {
            reference_value,
            reading: reference_value,
        }
    }

    pub fn reference_value(&self) -> f64 {
        self.reference_value
    }
}

impl ActionIf for Action {
    fn update_reading(&mut self, _now_ms: i64, new_reading: f64) -> Option<TriggerActionType> {
        if new_reading.is_nan() {
            return None;
        }
        let result = if new_reading > self.reference_value && self.reading <= self.reference_value
        {
            Some(TriggerActionType::Trigger)
        } else if new_reading < self.reference_value && self.reading >= self.reference_value {
            Some(TriggerActionType::Deactivate)
        } else {
            None
        };
        self.reading = new_reading;
        result
    }
}
