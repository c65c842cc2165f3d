//! Cumulative joule counter with fractional-sample carry (spec §4.3.4).
//! Grounded on `statistics/energy_statistic.hpp`.

use super::statistic::{StatValue, StatValuesMap};

/// Integrates power samples (in watts, over elapsed seconds the caller has
/// already folded in — the source feeds whole joules per tick) into a
/// monotonically increasing joule counter. A sample's fractional part is
/// carried forward (`leftover`) rather than truncated, so repeated small
/// increments still add up exactly.
pub struct EnergyStatistic {
    name: String,
    accumulated_value: u64,
    leftover: f64,
    total_elapsed_ms: f64,
    last_timestamp_ms: i64,
    is_last_sample_ok: bool,
}

impl EnergyStatistic {
    pub fn new(name: impl Into<String>, start_ms: i64) -> Self {
        Self {
            name: name.into(),
            accumulated_value: 0,
            leftover: 0.0,
            total_elapsed_ms: 0.0,
            last_timestamp_ms: start_ms,
            is_last_sample_ok: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn update_value(&mut self, now_ms: i64, new_value_joules: f64) {
        if !new_value_joules.is_nan() {
            self.is_last_sample_ok = true;
            let integral_part = new_value_joules.trunc();
            self.leftover += new_value_joules.fract();
            self.accumulated_value = self.accumulated_value.wrapping_add(integral_part as u64);

            if self.leftover > 1.0 {
                let carry = self.leftover.trunc();
                self.leftover = self.leftover.fract();
                self.accumulated_value = self.accumulated_value.wrapping_add(carry as u64);
            }
        } else {
            self.is_last_sample_ok = false;
        }

        self.total_elapsed_ms += (now_ms - self.last_timestamp_ms) as f64;
        self.last_timestamp_ms = now_ms;
    }

    pub fn reset(&mut self, now_ms: i64) {
        self.total_elapsed_ms = 0.0;
        self.last_timestamp_ms = now_ms;
        self.accumulated_value = 0;
        self.leftover = 0.0;
    }

    pub fn get_values_map(&self) -> StatValuesMap {
        let secs = self.total_elapsed_ms / 1000.0;
        let reporting_period = if secs.is_finite() && secs >= 0.0 && secs <= u32::MAX as f64 {
            StatValue::U32(secs as u32)
        } else {
            StatValue::Double(f64::NAN)
        };

        let mut stats = StatValuesMap::new();
        stats.insert("Current".into(), StatValue::U64(self.accumulated_value));
        stats.insert("StatisticsReportingPeriod".into(), reporting_period);
        stats.insert("MeasurementState".into(), StatValue::Bool(self.is_last_sample_ok));
        stats
    }
}
