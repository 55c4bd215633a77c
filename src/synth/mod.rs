// Purpose: voice lifecycle, pooling and block scheduling.
// Control threads trigger voices; the time-master thread renders them.

pub mod field;
pub mod poly;
pub mod pool;
pub mod voice;

pub use field::ParamField;
pub use poly::{PolySynth, SynthHandle, TriggerOffCallback, TriggerOnCallback};
pub use pool::VoicePool;
pub use voice::{SynthVoice, VoiceId, VoiceSlot, VoiceState};

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
/// Scheduler state stays usable; a poisoned lock is not worth crashing the
/// audio process over.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
