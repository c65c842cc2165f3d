//! GPIO edge trigger with configurable polarity (spec §4.2.4).
//! Grounded on `actions/action_gpio.hpp`.

use super::action::{ActionIf, TriggerActionType};

pub struct ActionGpio {
    trigger_on_rising_edge: bool,
    reading: f64,
}

impl ActionGpio {
    pub fn new(trigger_on_rising_edge: bool) -> Self {
        Self {
            trigger_on_rising_edge,
            reading: if trigger_on_rising_edge { 0.0 } else { 1.0 },
        }
    }
}

impl ActionIf for ActionGpio {
    fn update_reading(&mut self, _now_ms: i64, new_reading: f64) -> Option<TriggerActionType> {
        let result = if new_reading == 1.0 && self.reading == 0.0 {
            Some(if self.trigger_on_rising_edge {
                TriggerActionType::Trigger
            } else {
                TriggerActionType::Deactivate
            })
        } else if new_reading == 0.0 && self.reading == 1.0 {
            Some(if self.trigger_on_rising_edge {
                TriggerActionType::Deactivate
            } else {
                TriggerActionType::Trigger
            })
        } else {
            None
        };
        self.reading = new_reading;
        result
    }
}
