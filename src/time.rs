//! Virtual time shared between the control side and the render side.

use std::sync::atomic::{AtomicU64, Ordering};

/// Which subsystem advances the shared virtual clock.
///
/// Exactly one driver increments the master clock in any configuration. The
/// scheduler and the sequencer must agree on the mode, otherwise time would
/// be advanced twice per cycle when they are layered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMasterMode {
    /// The audio callback advances time once per block.
    Audio,
    /// The graphics frame callback advances time once per frame.
    Graphics,
    /// A dedicated polling thread advances time at a fixed granularity.
    Cpu,
    /// Some external collaborator advances time.
    External,
}

/// Monotonically increasing virtual time in seconds.
///
/// Stored as `f64` bits in an atomic so the driver thread and any number of
/// reader threads can share it without a lock. Only the configured time
/// master may call [`MasterClock::advance`] or [`MasterClock::set`].
#[derive(Debug, Default)]
pub struct MasterClock {
    bits: AtomicU64,
}

impl MasterClock {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0.0f64.to_bits()),
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    /// Advance the clock by `dt` seconds, returning the time before the
    /// advance (the start of the new block).
    pub fn advance(&self, dt: f64) -> f64 {
        let start = self.get();
        self.set(start + dt);
        start
    }
}
