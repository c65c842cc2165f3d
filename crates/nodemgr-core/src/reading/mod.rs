//! Typed multicast sensor bus (spec §3, §4.1).

pub mod bus;
pub mod consumer;
pub mod derived;
pub mod types;

pub use bus::{ReadingBus, ReadingHandle};
pub use consumer::{ClosureConsumer, ReadingConsumer};
pub use types::{DeviceIndex, ReadingEventKind, ReadingType, ALL_DEVICES, COMPONENT_ID_ALL};
