//! Bounded-memory moving average over a fixed window, held as a small
//! number of pre-averaged slots rather than raw samples (spec §4.3.2).
//!
//! Grounded on `statistics/moving_average.hpp`: the window is split into
//! [`PTAM_STATS_WINDOW_COUNT`] slots; each slot holds the time-weighted
//! accumulation for its span. When a sample closes a slot early, the
//! leftover duration seeds however many further slots it spans before the
//! remainder starts accumulating the current one.

use std::collections::VecDeque;

use super::average::Average;

/// Number of slots the averaging window is divided into, matching
/// `kPtamStatsWindowCount`.
pub const PTAM_STATS_WINDOW_COUNT: usize = 30;

#[derive(Debug, Clone, Copy)]
struct Sample {
    acc: f64,
    max: f64,
    min: f64,
}

pub struct MovingAverage {
    sampling_window_ms: f64,
    buffered: VecDeque<Sample>,
    acc_max: f64,
    acc_min: f64,
    acc_time_ms: f64,
    acc_reading: f64,
    timestamp_ms: i64,
    is_reset: bool,
    last_sample: f64,
}

impl MovingAverage {
    /// `period_ms` is the full window; it is internally split into
    /// [`PTAM_STATS_WINDOW_COUNT`] slots.
    pub fn new(period_ms: i64) -> Self {
        Self {
            sampling_window_ms: period_ms as f64 / PTAM_STATS_WINDOW_COUNT as f64,
            buffered: VecDeque::with_capacity(PTAM_STATS_WINDOW_COUNT),
            acc_max: f64::MIN,
            acc_min: f64::MAX,
            acc_time_ms: 0.0,
            acc_reading: 0.0,
            timestamp_ms: 0,
            is_reset: true,
            last_sample: f64::NAN,
        }
    }

    fn is_duration_beyond_window(&self, delta: f64) -> bool {
        self.acc_time_ms + delta >= self.sampling_window_ms
    }

    fn push_sample(&mut self, sample: Sample) {
        if self.buffered.len() == PTAM_STATS_WINDOW_COUNT {
            self.buffered.pop_front();
        }
        self.buffered.push_back(sample);
    }

    /// Closes the slot in progress, returns the leftover duration.
    fn close_current_sampling(&mut self, delta: f64) -> f64 {
        let duration_to_close = self.sampling_window_ms - self.acc_time_ms;
        self.acc_reading += self.last_sample * duration_to_close;
        self.push_sample(Sample {
            acc: self.acc_reading,
            max: self.acc_max,
            min: self.acc_min,
        });
        delta - duration_to_close
    }

    /// Seeds whole slots out of `remaining`, returns what's left over.
    fn create_new_samples(&mut self, mut remaining: f64) -> f64 {
        while remaining > self.sampling_window_ms {
            self.push_sample(Sample {
                acc: self.last_sample * self.sampling_window_ms,
                max: self.last_sample,
                min: self.last_sample,
            });
            remaining -= self.sampling_window_ms;
        }
        remaining
    }
}

impl Average for MovingAverage {
    fn add_sample(&mut self, now_ms: i64, sample: f64) {
        self.is_reset = false;
        if !sample.is_finite() {
            self.reset(now_ms);
            return;
        }

        let delta = (now_ms - self.timestamp_ms) as f64;
        self.timestamp_ms = now_ms;

        self.acc_min = self.acc_min.min(sample);
        self.acc_max = self.acc_max.max(sample);

        if self.last_sample.is_finite() {
            if self.is_duration_beyond_window(delta) {
                let leftover = self.close_current_sampling(delta);
                let leftover = self.create_new_samples(leftover);
                self.acc_reading = self.last_sample * leftover;
                self.acc_time_ms = leftover;
                self.acc_min = sample;
                self.acc_max = sample;
            } else {
                self.acc_reading += self.last_sample * delta;
                self.acc_time_ms += delta;
            }
        }

        self.last_sample = sample;
    }

    fn get_avg(&mut self, now_ms: i64) -> f64 {
        if self.is_reset {
            return f64::NAN;
        }
        self.add_sample(now_ms, self.last_sample);

        let total_acc: f64 = self.acc_reading + self.buffered.iter().map(|s| s.acc).sum::<f64>();
        let total_time_ms = self.acc_time_ms + self.sampling_window_ms * self.buffered.len() as f64;

        if total_time_ms != 0.0 {
            total_acc / total_time_ms
        } else {
            f64::NAN
        }
    }

    fn get_statistics_reporting_period_ms(&mut self, now_ms: i64) -> f64 {
        self.add_sample(now_ms, self.last_sample);
        self.buffered.len() as f64 * self.sampling_window_ms + self.acc_time_ms
    }

    fn get_min(&mut self, now_ms: i64) -> f64 {
        if self.is_reset {
            return f64::NAN;
        }
        self.add_sample(now_ms, self.last_sample);
        self.buffered
            .iter()
            .map(|s| s.min)
            .fold(self.acc_min, f64::min)
    }

    fn get_max(&mut self, now_ms: i64) -> f64 {
        if self.is_reset {
            return f64::NAN;
        }
        self.add_sample(now_ms, self.last_sample);
        self.buffered
            .iter()
            .map(|s| s.max)
            .fold(self.acc_max, f64::max)
    }

    fn reset(&mut self, now_ms: i64) {
        self.is_reset = true;
        self.acc_time_ms = 0.0;
        self.acc_reading = 0.0;
        self.acc_min = f64::MAX;
        self.acc_max = f64::MIN;
        self.timestamp_ms = now_ms;
        self.last_sample = f64::NAN;
        self.buffered.clear();
    }
}
