//! Averages, accumulators and the named statistics built on top of them
//! (spec §4.3).

pub mod accumulator;
pub mod average;
pub mod energy;
pub mod moving_average;
pub mod normal_average;
pub mod provider;
pub mod statistic;
pub mod throttling;

pub use accumulator::{AccumulatorIf, GlobalAccumulator, PolicyAccumulator};
pub use average::Average;
pub use energy::EnergyStatistic;
pub use moving_average::MovingAverage;
pub use normal_average::NormalAverage;
pub use provider::StatisticsProvider;
pub use statistic::{StatValue, StatValuesMap, Statistic, StatisticIf};
pub use throttling::{ThrottlingBounds, ThrottlingStatistic};
