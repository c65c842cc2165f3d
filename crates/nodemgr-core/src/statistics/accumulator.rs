//! Accumulators pair a long-window average (reset only on demand) with a
//! one-second moving average used for "current value" reporting
//! (spec §4.3.3). Grounded on `statistics/global_accumulator.hpp` and
//! `statistics/policy_accumulator.hpp`.

use super::average::Average;
use super::moving_average::MovingAverage;
use super::normal_average::NormalAverage;

pub const ONE_SECOND_MS: i64 = 1_000;

pub trait AccumulatorIf {
    fn add_sample(&mut self, now_ms: i64, sample: f64);
    fn get_avg(&mut self, now_ms: i64) -> f64;
    fn get_min(&mut self, now_ms: i64) -> f64;
    fn get_max(&mut self, now_ms: i64) -> f64;
    fn get_statistics_reporting_period_ms(&mut self, now_ms: i64) -> f64;
    fn reset(&mut self, now_ms: i64);
    fn get_current_value(&mut self, now_ms: i64) -> f64;
}

/// Accumulates since the last explicit reset — used for domain-wide
/// statistics that only reset on an operator's `ResetStatistics` call.
pub struct GlobalAccumulator {
    last_reset_average: NormalAverage,
    one_second_moving_average: MovingAverage,
}

impl Default for GlobalAccumulator {
    fn default() -> Self {
        Self {
            last_reset_average: NormalAverage::new(),
            one_second_moving_average: MovingAverage::new(ONE_SECOND_MS),
        }
    }
}

impl GlobalAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccumulatorIf for GlobalAccumulator {
    fn add_sample(&mut self, now_ms: i64, sample: f64) {
        self.last_reset_average.add_sample(now_ms, sample);
        self.one_second_moving_average.add_sample(now_ms, sample);
    }

    fn get_avg(&mut self, now_ms: i64) -> f64 {
        self.last_reset_average.get_avg(now_ms)
    }

    fn get_min(&mut self, now_ms: i64) -> f64 {
        self.last_reset_average.get_min(now_ms)
    }

    fn get_max(&mut self, now_ms: i64) -> f64 {
        self.last_reset_average.get_max(now_ms)
    }

    fn get_statistics_reporting_period_ms(&mut self, now_ms: i64) -> f64 {
        self.last_reset_average.get_statistics_reporting_period_ms(now_ms)
    }

    fn reset(&mut self, now_ms: i64) {
        self.last_reset_average.reset(now_ms);
        self.one_second_moving_average.reset(now_ms);
    }

    fn get_current_value(&mut self, now_ms: i64) -> f64 {
        self.one_second_moving_average.get_avg(now_ms)
    }
}

/// Accumulates over a caller-chosen window (a policy's configured
/// statistics reporting period) alongside the same one-second view.
pub struct PolicyAccumulator {
    user_defined_moving_average: MovingAverage,
    one_second_moving_average: MovingAverage,
}

impl PolicyAccumulator {
    pub fn new(period_ms: i64) -> Self {
        Self {
            user_defined_moving_average: MovingAverage::new(period_ms),
            one_second_moving_average: MovingAverage::new(ONE_SECOND_MS),
        }
    }
}

impl AccumulatorIf for PolicyAccumulator {
    fn add_sample(&mut self, now_ms: i64, sample: f64) {
        self.user_defined_moving_average.add_sample(now_ms, sample);
        self.one_second_moving_average.add_sample(now_ms, sample);
    }

    fn get_avg(&mut self, now_ms: i64) -> f64 {
        self.user_defined_moving_average.get_avg(now_ms)
    }

    fn get_min(&mut self, now_ms: i64) -> f64 {
        self.user_defined_moving_average.get_min(now_ms)
    }

    fn get_max(&mut self, now_ms: i64) -> f64 {
        self.user_defined_moving_average.get_max(now_ms)
    }

    fn get_statistics_reporting_period_ms(&mut self, now_ms: i64) -> f64 {
        self.user_defined_moving_average
            .get_statistics_reporting_period_ms(now_ms)
    }

    fn reset(&mut self, now_ms: i64) {
        self.user_defined_moving_average.reset(now_ms);
        self.one_second_moving_average.reset(now_ms);
    }

    fn get_current_value(&mut self, now_ms: i64) -> f64 {
        self.one_second_moving_average.get_avg(now_ms)
    }
}
