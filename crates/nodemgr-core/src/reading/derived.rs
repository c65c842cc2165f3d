//! Platform power efficiency: a reading computed from other readings rather
//! than sampled off hardware directly (spec §4.1's "derived reading").
//!
//! Grounded on `readings/reading_power_efficiency.hpp`: per tick, each PSU's
//! instantaneous efficiency (DC output / AC input) feeds its own 5-second
//! moving average, and the sum of all PSUs' DC and AC readings feeds a
//! platform-wide moving average of the same window.

use crate::statistics::MovingAverage;

use super::types::{DeviceIndex, ALL_DEVICES};

const PSU_AVERAGING_WINDOW_MS: i64 = 5_000;

/// Tracks per-PSU and platform-aggregate power efficiency.
///
/// Call [`Self::tick`] once per control loop iteration with the current
/// `(ac, dc)` reading pair for every PSU (`None` where a PSU's AC or DC
/// reading is unavailable), then read back [`Self::psu_efficiency`] or
/// [`Self::platform_efficiency`].
pub struct PowerEfficiency {
    per_psu: Vec<MovingAverage>,
    total: MovingAverage,
}

impl PowerEfficiency {
    pub fn new(psu_count: usize) -> Self {
        Self {
            per_psu: (0..psu_count)
                .map(|_| MovingAverage::new(PSU_AVERAGING_WINDOW_MS))
                .collect(),
            total: MovingAverage::new(PSU_AVERAGING_WINDOW_MS),
        }
    }

    /// Feeds one tick's worth of AC/DC samples, keyed by PSU index.
    pub fn tick(&mut self, now_ms: i64, psu_readings: &[Option<(f64, f64)>]) {
        let mut ac_sum = 0.0;
        let mut dc_sum = 0.0;
        let mut any_valid = false;

        for (index, reading) in psu_readings.iter().enumerate() {
            let Some((ac, dc)) = reading else { continue };
            let Some(average) = self.per_psu.get_mut(index) else {
                continue;
            };
            if *ac == 0.0 {
                continue;
            }
            any_valid = true;
            ac_sum += ac;
            dc_sum += dc;
            average.add_sample(now_ms, dc / ac);
        }

        if any_valid && ac_sum != 0.0 {
            self.total.add_sample(now_ms, dc_sum / ac_sum);
        }
    }

    /// Efficiency for one PSU, or platform-wide efficiency via `ALL_DEVICES`.
    pub fn efficiency(&self, device: DeviceIndex) -> f64 {
        if device == ALL_DEVICES {
            self.total.get_avg()
        } else {
            self.per_psu
                .get(device as usize)
                .map(|a| a.get_avg())
                .unwrap_or(f64::NAN)
        }
    }

    pub fn platform_efficiency(&self) -> f64 {
        self.total.get_avg()
    }

    pub fn psu_efficiency(&self, psu_index: usize) -> f64 {
        self.per_psu
            .get(psu_index)
            .map(|a| a.get_avg())
            .unwrap_or(f64::NAN)
    }
}
