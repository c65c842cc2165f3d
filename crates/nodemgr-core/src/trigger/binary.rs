//! Binary-state trigger (spec §4.2.3): fires on a 0/1 edge, ignoring any
//! reading outside that range. Grounded on `actions/action_binary.hpp`.

use super::action::{ActionIf, TriggerActionType};

pub struct ActionBinary {
    reading: f64,
}

impl ActionBinary {
    pub fn new(initial_value: f64) -> Self {
        Self { reading: initial_value }
    }
}

fn is_binary(value: f64) -> bool {
    value == 0.0 || value == 1.0
}

impl ActionIf for ActionBinary {
    fn update_reading(&mut self, _now_ms: i64, new_reading: f64) -> Option<TriggerActionType> {
        if !is_binary(new_reading) {
            return None;
        }
        let result = if new_reading > self.reading {
            Some(TriggerActionType::Trigger)
        } else if new_reading < self.reading {
            Some(TriggerActionType::Deactivate)
        } else {
            None
        };
        self.reading = new_reading;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_edge_triggers() {
        let mut action = ActionBinary::new(0.0);
        assert_eq!(action.update_reading(0, 1.0), Some(TriggerActionType::Trigger));
    }

    #[test]
    fn non_binary_reading_ignored() {
        let mut action = ActionBinary::new(0.0);
        assert_eq!(action.update_reading(0, 0.5), None);
    }
}
