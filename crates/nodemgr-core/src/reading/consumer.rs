//! Reading consumers (spec §3): a callback sink bound to one reading.

use super::types::ReadingEventKind;

/// A sink that accepts samples and/or out-of-band events from exactly one
/// reading. A consumer may not be re-used across readings (enforced by the
/// bus returning a fresh handle per registration); de-registration is
/// required before drop, otherwise the bus keeps delivering into a stale
/// slot until the next `unregister`.
pub trait ReadingConsumer: Send {
    /// Called with the latest sample on every tick. Invalid reads deliver
    /// `NaN` (spec §4.1).
    fn on_sample(&mut self, _value: f64) {}

    /// Called when the reading's availability or source changes.
    fn on_event(&mut self, _event: ReadingEventKind) {}
}

/// A closure-based consumer, mirroring the source's `ReadingEvent`: built
/// from a sample callback, an event callback, or both.
pub struct ClosureConsumer {
    on_sample: Option<Box<dyn FnMut(f64) + Send>>,
    on_event: Option<Box<dyn FnMut(ReadingEventKind) + Send>>,
}

impl ClosureConsumer {
    pub fn sample(f: impl FnMut(f64) + Send + 'static) -> Self {
        Self {
            on_sample: Some(Box::new(f)),
            on_event: None,
        }
    }

    pub fn event(f: impl FnMut(ReadingEventKind) + Send + 'static) -> Self {
        Self {
            on_sample: None,
            on_event: Some(Box::new(f)),
        }
    }

    pub fn both(
        sample: impl FnMut(f64) + Send + 'static,
        event: impl FnMut(ReadingEventKind) + Send + 'static,
    ) -> Self {
        Self {
            on_sample: Some(Box::new(sample)),
            on_event: Some(Box::new(event)),
        }
    }
}

impl ReadingConsumer for ClosureConsumer {
    fn on_sample(&mut self, value: f64) {
        if let Some(f) = self.on_sample.as_mut() {
            f(value);
        }
    }

    fn on_event(&mut self, event: ReadingEventKind) {
        if let Some(f) = self.on_event.as_mut() {
            f(event);
        }
    }
}
