//! CPU-utilization trigger: averaged over a fixed correction window, with
//! trigger/deactivate polarity inverted relative to [`super::action::Action`]
//! (spec §4.2.2). Grounded on `actions/action_cpu_utilization.hpp`.

use crate::statistics::Average;

use super::action::{ActionIf, TriggerActionType};

/// Unlike a plain threshold [`super::action::Action`], this fires
/// `Deactivate` on the upward crossing and `Trigger` on the downward one:
/// a CPU-utilization trigger is meant to fire when usage drops below the
/// configured level (idle detection), not when it rises above it.
pub struct ActionCpuUtilization {
    reference_value: f64,
    reading: f64,
    average: Box<dyn Average + Send>,
}

impl ActionCpuUtilization {
    pub fn new(reference_value: f64, average: Box<dyn Average + Send>) -> Self {
        Self {
            reference_value,
            reading: reference_value,
            average,
        }
    }
}

impl ActionIf for ActionCpuUtilization {
    fn update_reading(&mut self, now_ms: i64, new_reading: f64) -> Option<TriggerActionType> {
        self.average.add_sample(now_ms, new_reading);
        let current_average = self.average.get_avg(now_ms);

        let result = if current_average > self.reference_value && self.reading <= self.reference_value {
            Some(TriggerActionType::Deactivate)
        } else if current_average < self.reference_value && self.reading >= self.reference_value {
            Some(TriggerActionType::Trigger)
        } else {
            None
        };
        self.reading = current_average;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::MovingAverage;

    #[test]
    fn sustained_drop_below_threshold_triggers() {
        let mut action = ActionCpuUtilization::new(50.0, Box::new(MovingAverage::new(2_000)));
        // First sample at a nonzero timestamp so the averaging window has a
        // real elapsed duration to weight against instead of a zero-length one.
        action.update_reading(1_000, 10.0);
        let events: Vec<_> = (1_100..=3_200)
            .step_by(100)
            .filter_map(|t| action.update_reading(t, 10.0))
            .collect();
        assert!(events.contains(&TriggerActionType::Trigger));
    }
}
