//! Typed multicast reading bus (spec §3, §4.1).
//!
//! Consumers register against a `(ReadingType, DeviceIndex)` pair and get a
//! generation-tagged handle back, the arena pattern noted in spec §9: a
//! `Vec<Option<Slot>>` with a free list, so unregistering one consumer never
//! invalidates another's index, and a stale handle used after unregister is
//! simply ignored rather than panicking.

use std::collections::HashMap;

use super::consumer::ReadingConsumer;
use super::types::{DeviceIndex, ReadingEventKind, ReadingType, ALL_DEVICES};

/// Opaque reference to a registered consumer, returned by [`ReadingBus::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingHandle {
    index: usize,
    generation: u64,
}

struct Slot {
    reading_type: ReadingType,
    device: DeviceIndex,
    consumer: Box<dyn ReadingConsumer>,
}

/// The last known value and availability of one reading source.
#[derive(Debug, Clone, Copy, Default)]
struct SourceState {
    value: f64,
    available: bool,
}

/// Multicast hub: readings are published once per tick by the collecting
/// side (`devicesManager` in spec terms) and fanned out to every registered
/// consumer for that `(ReadingType, DeviceIndex)`.
#[derive(Default)]
pub struct ReadingBus {
    slots: Vec<Option<Slot>>,
    /// Generation of each index, bumped every time it is registered into.
    /// Outlives the slot itself so a stale handle can be detected after the
    /// slot has been freed and possibly reused.
    generations: Vec<u64>,
    free: Vec<usize>,
    sources: HashMap<(ReadingType, DeviceIndex), SourceState>,
}

impl ReadingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer for a specific device, or `ALL_DEVICES` to
    /// receive every device's samples for that reading type.
    pub fn register(
        &mut self,
        reading_type: ReadingType,
        device: DeviceIndex,
        consumer: Box<dyn ReadingConsumer>,
    ) -> ReadingHandle {
        let slot = Slot {
            reading_type,
            device,
            consumer,
        };
        if let Some(index) = self.free.pop() {
            self.generations[index] = self.generations[index].wrapping_add(1);
            self.slots[index] = Some(slot);
            ReadingHandle {
                index,
                generation: self.generations[index],
            }
        } else {
            let index = self.slots.len();
            self.slots.push(Some(slot));
            self.generations.push(0);
            ReadingHandle {
                index,
                generation: 0,
            }
        }
    }

    /// Removes a consumer. A handle from a prior registration at the same
    /// index (already unregistered, slot reused) is silently ignored.
    pub fn unregister(&mut self, handle: ReadingHandle) {
        if self.generations.get(handle.index) == Some(&handle.generation)
            && self.slots.get(handle.index).map(Option::is_some) == Some(true)
        {
            self.slots[handle.index] = None;
            self.free.push(handle.index);
        }
    }

    /// Publishes a new sample. Delivers to every consumer registered on
    /// `device` plus every consumer registered on `ALL_DEVICES`.
    pub fn publish(&mut self, reading_type: ReadingType, device: DeviceIndex, value: f64) {
        self.sources.insert(
            (reading_type, device),
            SourceState {
                value,
                available: !value.is_nan(),
            },
        );
        for slot in self.slots.iter_mut().flatten() {
            if slot.reading_type == reading_type
                && (slot.device == device || slot.device == ALL_DEVICES)
            {
                slot.consumer.on_sample(value);
            }
        }
    }

    /// Publishes an availability/source-change event for a reading.
    pub fn publish_event(
        &mut self,
        reading_type: ReadingType,
        device: DeviceIndex,
        event: ReadingEventKind,
    ) {
        if let Some(state) = self.sources.get_mut(&(reading_type, device)) {
            state.available = matches!(event, ReadingEventKind::Available);
        }
        for slot in self.slots.iter_mut().flatten() {
            if slot.reading_type == reading_type
                && (slot.device == device || slot.device == ALL_DEVICES)
            {
                slot.consumer.on_event(event);
            }
        }
    }

    /// Last published value for a reading, if any sample has ever arrived.
    pub fn last_value(&self, reading_type: ReadingType, device: DeviceIndex) -> Option<f64> {
        self.sources.get(&(reading_type, device)).map(|s| s.value)
    }

    pub fn is_available(&self, reading_type: ReadingType, device: DeviceIndex) -> bool {
        self.sources
            .get(&(reading_type, device))
            .map(|s| s.available)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use super::super::consumer::ClosureConsumer;

    #[test]
    fn delivers_to_matching_device_only() {
        let mut bus = ReadingBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.register(
            ReadingType::CpuPower,
            0,
            Box::new(ClosureConsumer::sample(move |v| {
                seen_clone.lock().unwrap().push(v);
            })),
        );
        bus.publish(ReadingType::CpuPower, 0, 42.0);
        bus.publish(ReadingType::CpuPower, 1, 99.0);
        assert_eq!(*seen.lock().unwrap(), vec![42.0]);
    }

    #[test]
    fn all_devices_consumer_sees_every_device() {
        let mut bus = ReadingBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.register(
            ReadingType::CpuPower,
            ALL_DEVICES,
            Box::new(ClosureConsumer::sample(move |v| {
                seen_clone.lock().unwrap().push(v);
            })),
        );
        bus.publish(ReadingType::CpuPower, 0, 1.0);
        bus.publish(ReadingType::CpuPower, 1, 2.0);
        assert_eq!(*seen.lock().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn unregister_stops_delivery() {
        let mut bus = ReadingBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let handle = bus.register(
            ReadingType::CpuPower,
            0,
            Box::new(ClosureConsumer::sample(move |v| {
                seen_clone.lock().unwrap().push(v);
            })),
        );
        bus.unregister(handle);
        bus.publish(ReadingType::CpuPower, 0, 7.0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn event_updates_availability() {
        let mut bus = ReadingBus::new();
        bus.publish(ReadingType::CpuPower, 0, 5.0);
        assert!(bus.is_available(ReadingType::CpuPower, 0));
        bus.publish_event(ReadingType::CpuPower, 0, ReadingEventKind::Unavailable);
        assert!(!bus.is_available(ReadingType::CpuPower, 0));
    }
}
