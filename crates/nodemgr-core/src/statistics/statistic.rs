//! Named, resettable statistics exposed over the RPC surface's
//! `GetStatistics` call (spec §4.3, §6). Grounded on `statistics/statistic.hpp`
//! and `statistics/statistic_if.hpp`.

use std::collections::HashMap;

use crate::reading::ReadingConsumer;

use super::accumulator::AccumulatorIf;

/// One reported field of a statistic's value map. Mirrors the source's
/// `std::variant<double, uint32_t, uint64_t, bool>`.
#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Double(f64),
    U32(u32),
    U64(u64),
    Bool(bool),
}

pub type StatValuesMap = HashMap<String, StatValue>;

pub trait StatisticIf: ReadingConsumer {
    fn update_value(&mut self, now_ms: i64, new_value: f64);
    fn reset_stat(&mut self, now_ms: i64);
    /// Takes `&mut self`: computing the reporting period and current value
    /// closes the accumulator's in-progress averaging slot, the same way
    /// the source's "const" getter reaches through a non-const accumulator
    /// pointer to do it.
    fn get_values_map(&mut self, now_ms: i64) -> StatValuesMap;
    fn name(&self) -> &str;
    fn enable_statistic_calculation(&mut self, now_ms: i64);
    fn disable_statistic_calculation(&mut self);
}

fn reporting_period_value(secs: f64) -> StatValue {
    if secs.is_finite() && secs >= 0.0 && secs <= u32::MAX as f64 {
        StatValue::U32(secs as u32)
    } else {
        StatValue::Double(f64::NAN)
    }
}

/// A statistic backed by an [`AccumulatorIf`]: tracks current/min/max/average
/// plus whether the last sample was usable.
pub struct Statistic {
    accumulator: Box<dyn AccumulatorIf + Send>,
    name: String,
    has_finite_value: bool,
    is_last_sample_ok: bool,
    enabled: bool,
}

impl Statistic {
    pub fn new(name: impl Into<String>, accumulator: Box<dyn AccumulatorIf + Send>) -> Self {
        Self {
            accumulator,
            name: name.into(),
            has_finite_value: false,
            is_last_sample_ok: false,
            enabled: true,
        }
    }
}

impl ReadingConsumer for Statistic {}

impl StatisticIf for Statistic {
    fn update_value(&mut self, now_ms: i64, new_value: f64) {
        if !new_value.is_finite() {
            self.is_last_sample_ok = false;
            return;
        }
        if self.enabled {
            self.accumulator.add_sample(now_ms, new_value);
            self.has_finite_value = true;
            self.is_last_sample_ok = true;
        }
    }

    fn reset_stat(&mut self, now_ms: i64) {
        self.accumulator.reset(now_ms);
        self.has_finite_value = false;
    }

    fn get_values_map(&mut self, now_ms: i64) -> StatValuesMap {
        let mut stats = StatValuesMap::new();
        let reporting_period =
            reporting_period_value(self.accumulator.get_statistics_reporting_period_ms(now_ms) / 1000.0);

        if !self.has_finite_value {
            stats.insert("Current".into(), StatValue::Double(f64::NAN));
            stats.insert("Max".into(), StatValue::Double(f64::NAN));
            stats.insert("Min".into(), StatValue::Double(f64::NAN));
            stats.insert("Average".into(), StatValue::Double(f64::NAN));
            stats.insert("StatisticsReportingPeriod".into(), reporting_period);
            stats.insert("MeasurementState".into(), StatValue::Bool(false));
        } else {
            stats.insert(
                "Current".into(),
                StatValue::Double(self.accumulator.get_current_value(now_ms)),
            );
            stats.insert("Max".into(), StatValue::Double(self.accumulator.get_max(now_ms)));
            stats.insert("Min".into(), StatValue::Double(self.accumulator.get_min(now_ms)));
            stats.insert("Average".into(), StatValue::Double(self.accumulator.get_avg(now_ms)));
            stats.insert("StatisticsReportingPeriod".into(), reporting_period);
            stats.insert(
                "MeasurementState".into(),
                StatValue::Bool(self.enabled && self.is_last_sample_ok),
            );
        }
        stats
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn enable_statistic_calculation(&mut self, now_ms: i64) {
        self.enabled = true;
        self.reset_stat(now_ms);
    }

    fn disable_statistic_calculation(&mut self) {
        self.enabled = false;
    }
}
