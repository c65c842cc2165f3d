//! Registry of live statistics, and the `ResetStatistics`/`GetStatistics`
//! RPC surface over them (spec §4.3.6, §6).
//! Grounded on `statistics/statistics_provider.hpp`.

use std::collections::HashMap;

use crate::reading::{DeviceIndex, ReadingBus, ReadingType};

use super::statistic::{StatValuesMap, StatisticIf};

/// A registered statistic together with the reading it's subscribed to —
/// `StatisticIf` itself only knows how to fold in a sample, not where that
/// sample comes from (spec §4.3.6: "each subscribed to a reading").
struct Subscription {
    reading_type: ReadingType,
    device: DeviceIndex,
    stat: Box<dyn StatisticIf + Send>,
}

pub struct StatisticsProvider {
    statistics: Vec<Subscription>,
}

impl Default for StatisticsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsProvider {
    pub fn new() -> Self {
        Self {
            statistics: Vec::new(),
        }
    }

    /// Registers `stat` against `(reading_type, device)`; every `update_from_bus`
    /// call feeds it that reading's last published value.
    pub fn add_statistic(&mut self, reading_type: ReadingType, device: DeviceIndex, stat: Box<dyn StatisticIf + Send>) {
        tracing::debug!(name = stat.name(), "registering statistic");
        self.statistics.push(Subscription { reading_type, device, stat });
    }

    /// Pulls each registered statistic's bound reading off `bus` and folds
    /// it in — driven once per tick by the engine, the same pull shape
    /// `poll_triggers`/`poll_limit_exceptions` use rather than a push-based
    /// `ReadingConsumer` registration (samples need `now_ms`, which the bus's
    /// `on_sample` callback doesn't carry).
    pub fn update_from_bus(&mut self, now_ms: i64, bus: &ReadingBus) {
        for sub in &mut self.statistics {
            let value = bus.last_value(sub.reading_type, sub.device).unwrap_or(f64::NAN);
            sub.stat.update_value(now_ms, value);
        }
    }

    pub fn remove_all(&mut self) {
        tracing::debug!("unregistering statistics");
        self.statistics.clear();
    }

    pub fn reset_statistics(&mut self, now_ms: i64) {
        for sub in &mut self.statistics {
            sub.stat.reset_stat(now_ms);
        }
    }

    pub fn get_statistics(&mut self, now_ms: i64) -> HashMap<String, StatValuesMap> {
        self.statistics
            .iter_mut()
            .map(|sub| (sub.stat.name().to_string(), sub.stat.get_values_map(now_ms)))
            .collect()
    }

    pub fn enable_all(&mut self, now_ms: i64) {
        for sub in &mut self.statistics {
            sub.stat.enable_statistic_calculation(now_ms);
        }
    }

    pub fn disable_all(&mut self) {
        for sub in &mut self.statistics {
            sub.stat.disable_statistic_calculation();
        }
    }
}
