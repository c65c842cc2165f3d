//! Sub-domain efficiency tracking for the compound distributor (spec §4.7):
//! `η = subDomainPower / feedbackReading`, averaged over a configurable
//! window. Grounded on the same `MovingAverage` the platform-efficiency
//! reading (`reading/derived.rs`) already uses — `power_limit_selector.hpp`'s
//! sibling `EfficiencyHelper` header is not present in the retrieval pack, so
//! this reuses the crate's existing averaging primitive rather than
//! reinventing one.

use crate::statistics::{Average, MovingAverage};

pub struct EfficiencyHelper {
    average: MovingAverage,
}

impl EfficiencyHelper {
    pub fn new(averaging_period_ms: i64) -> Self {
        Self {
            average: MovingAverage::new(averaging_period_ms),
        }
    }

    /// Feeds one tick's `(subDomainPower, feedbackReading)` pair. A
    /// non-finite or zero feedback reading contributes no sample (the ratio
    /// is undefined), leaving the average unchanged.
    pub fn update(&mut self, now_ms: i64, sub_domain_power: f64, feedback_reading: f64) {
        if !feedback_reading.is_finite() || feedback_reading == 0.0 || !sub_domain_power.is_finite() {
            return;
        }
        self.average.add_sample(now_ms, sub_domain_power / feedback_reading);
    }

    pub fn efficiency(&mut self, now_ms: i64) -> f64 {
        self.average.get_avg(now_ms)
    }
}
