//! Translates an applied limit into a 0-100% throttling figure relative to
//! a domain's capability bounds (spec §4.3.5).
//! Grounded on `statistics/throttling_statistic.hpp`.

use crate::reading::ReadingConsumer;

use super::accumulator::AccumulatorIf;
use super::statistic::{StatValuesMap, Statistic, StatisticIf};

const PERCENT_100: f64 = 100.0;
const PERCENT_0: f64 = 0.0;

/// Capability bounds a throttling calculation needs. Implemented by
/// `capability::DomainCapabilities`.
pub trait ThrottlingBounds {
    fn max(&self) -> f64;
    fn min(&self) -> f64;
}

pub struct ThrottlingStatistic<C: ThrottlingBounds + Send> {
    inner: Statistic,
    capabilities: C,
}

impl<C: ThrottlingBounds + Send> ThrottlingStatistic<C> {
    pub fn new(name: impl Into<String>, accumulator: Box<dyn AccumulatorIf + Send>, capabilities: C) -> Self {
        Self {
            inner: Statistic::new(name, accumulator),
            capabilities,
        }
    }

    fn calculate_throttling(&self, limit_value: f64) -> f64 {
        let (max, min) = (self.capabilities.max(), self.capabilities.min());
        if max <= min {
            return f64::NAN;
        }
        let mut value = (limit_value - min) * PERCENT_100;
        value /= max - min;
        value = PERCENT_100 - value;
        value.clamp(PERCENT_0, PERCENT_100)
    }
}

impl<C: ThrottlingBounds + Send> ReadingConsumer for ThrottlingStatistic<C> {}

impl<C: ThrottlingBounds + Send> StatisticIf for ThrottlingStatistic<C> {
    fn update_value(&mut self, now_ms: i64, new_value: f64) {
        let throttling = self.calculate_throttling(new_value);
        self.inner.update_value(now_ms, throttling);
    }

    fn reset_stat(&mut self, now_ms: i64) {
        self.inner.reset_stat(now_ms);
    }

    fn get_values_map(&mut self, now_ms: i64) -> StatValuesMap {
        self.inner.get_values_map(now_ms)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn enable_statistic_calculation(&mut self, now_ms: i64) {
        self.inner.enable_statistic_calculation(now_ms);
    }

    fn disable_statistic_calculation(&mut self) {
        self.inner.disable_statistic_calculation();
    }
}
