//! Time-weighted average over the whole period since the last reset
//! (spec §4.3.1). Grounded on `statistics/normal_average.hpp`.

use super::average::Average;

pub struct NormalAverage {
    acc_max: f64,
    acc_min: f64,
    acc_time_ms: f64,
    acc_reading: f64,
    timestamp_ms: i64,
    is_reset: bool,
    last_sample: f64,
}

impl Default for NormalAverage {
    fn default() -> Self {
        Self {
            acc_max: f64::MIN,
            acc_min: f64::MAX,
            acc_time_ms: 0.0,
            acc_reading: 0.0,
            timestamp_ms: 0,
            is_reset: true,
            last_sample: f64::NAN,
        }
    }
}

impl NormalAverage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Average for NormalAverage {
    fn add_sample(&mut self, now_ms: i64, sample: f64) {
        self.is_reset = false;
        if !sample.is_finite() {
            self.reset(now_ms);
            return;
        }

        let delta = (now_ms - self.timestamp_ms) as f64;
        self.timestamp_ms = now_ms;

        if self.last_sample.is_finite() {
            self.acc_reading += self.last_sample * delta;
            self.acc_time_ms += delta;
        }

        self.acc_min = self.acc_min.min(sample);
        self.acc_max = self.acc_max.max(sample);
        self.last_sample = sample;
    }

    fn get_avg(&mut self, now_ms: i64) -> f64 {
        if self.is_reset {
            return f64::NAN;
        }
        self.add_sample(now_ms, self.last_sample);
        self.acc_reading / self.acc_time_ms
    }

    fn get_statistics_reporting_period_ms(&mut self, now_ms: i64) -> f64 {
        self.add_sample(now_ms, self.last_sample);
        self.acc_time_ms
    }

    fn get_min(&mut self, _now_ms: i64) -> f64 {
        if self.is_reset {
            return f64::NAN;
        }
        self.acc_min
    }

    fn get_max(&mut self, _now_ms: i64) -> f64 {
        if self.is_reset {
            return f64::NAN;
        }
        self.acc_max
    }

    fn reset(&mut self, now_ms: i64) {
        self.is_reset = true;
        self.acc_time_ms = 0.0;
        self.acc_reading = 0.0;
        self.acc_min = f64::MAX;
        self.acc_max = f64::MIN;
        self.timestamp_ms = now_ms;
        self.last_sample = f64::NAN;
    }
}
