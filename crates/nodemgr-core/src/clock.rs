//! Clock abstraction (spec §9: "the clock is abstracted behind a `Now()`
//! trait for test control").

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic-enough source of "now", in milliseconds.
///
/// Real code uses [`SystemClock`]; tests use [`ManualClock`] to control
/// elapsed time deterministically (statistics windows, limit-exception
/// correction timers).
pub trait Now: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Now for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A clock tests can advance explicitly.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, delta_ms: i64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.millis.store(ms, Ordering::SeqCst);
    }
}

impl Now for ManualClock {
    fn now_ms(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Lets a [`ManualClock`] be handed to an `Engine` (which takes ownership of
/// its `Box<dyn Now>`) while a test keeps its own `Arc` to advance it.
impl Now for std::sync::Arc<ManualClock> {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
    }

    #[test]
    fn arc_manual_clock_shares_state() {
        let clock = std::sync::Arc::new(ManualClock::new(0));
        let handle: Box<dyn Now> = Box::new(clock.clone());
        clock.advance(250);
        assert_eq!(handle.now_ms(), 250);
    }
}
