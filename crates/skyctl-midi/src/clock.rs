//! Time source for press-duration measurement
//!
//! Timestamps are plain microsecond counts so they can be published through
//! atomics. Only differences between two readings of the same clock matter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic microsecond clock
pub trait Clock: Send + Sync {
    fn now_micros(&self) -> u64;
}

/// Wall clock measured from the moment it was created
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Clock that only moves when told to
///
/// Used by tests and by hosts that replay recorded input.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_secs(&self, secs: f64) {
        self.micros
            .store((secs * 1_000_000.0).round() as u64, Ordering::Release);
    }

    pub fn advance_secs(&self, secs: f64) {
        self.micros
            .fetch_add((secs * 1_000_000.0).round() as u64, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.micros.load(Ordering::Acquire)
    }
}
