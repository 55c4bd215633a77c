//! Free-list voice pool with a type-name-keyed factory registry.
//!
//! Voices are recycled, not destroyed: a voice that finishes goes back to
//! the free set and is handed out again on the next request for its type.
//! All pool mutation happens on the control side under a single mutex; the
//! render path never touches the pool except for the short reclaim swap at
//! the end of a master block.

use std::collections::{HashMap, HashSet};

use crate::error::SceneError;
use crate::synth::voice::{SynthVoice, VoiceSlot};

type VoiceFactory = Box<dyn Fn() -> Box<dyn SynthVoice> + Send>;

/// Mapping from type name to free instances and factories.
#[derive(Default)]
pub struct VoicePool {
    free: Vec<VoiceSlot>,
    factories: HashMap<String, VoiceFactory>,
    no_alloc: HashSet<String>,
}

impl VoicePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a voice type. Replaces any factory previously
    /// registered under the same name.
    pub fn register<V, F>(&mut self, name: impl Into<String>, factory: F)
    where
        V: SynthVoice + 'static,
        F: Fn() -> V + Send + 'static,
    {
        self.factories
            .insert(name.into(), Box::new(move || Box::new(factory())));
    }

    /// Disable automatic construction for a type. `acquire` will then only
    /// hand out recycled instances and fail once the free set is empty.
    pub fn disable_allocation(&mut self, name: impl Into<String>) {
        self.no_alloc.insert(name.into());
    }

    /// Take a voice whose type tag matches `name` (exact or prefix match)
    /// from the free set, constructing a new one if allowed and necessary.
    pub fn acquire(&mut self, name: &str) -> Result<VoiceSlot, SceneError> {
        // Exact names match their own prefix.
        if let Some(index) = self
            .free
            .iter()
            .position(|slot| slot.type_name().starts_with(name))
        {
            return Ok(self.free.swap_remove(index));
        }
        if self.no_alloc.contains(name) {
            return Err(SceneError::NoVoiceAvailable(name.to_owned()));
        }
        self.construct(name)
    }

    /// Return a voice to the free set, clearing its lifecycle state.
    pub fn release(&mut self, mut slot: VoiceSlot) {
        slot.reset();
        self.free.push(slot);
    }

    /// Pre-allocate `count` instances of a registered type.
    pub fn allocate_polyphony(&mut self, name: &str, count: usize) -> Result<(), SceneError> {
        for _ in 0..count {
            let slot = self.construct(name)?;
            self.free.push(slot);
        }
        Ok(())
    }

    /// Number of free instances, across all types.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of free instances matching a type name.
    pub fn free_count_for(&self, name: &str) -> usize {
        self.free
            .iter()
            .filter(|slot| slot.type_name().starts_with(name))
            .count()
    }

    fn construct(&self, name: &str) -> Result<VoiceSlot, SceneError> {
        match self.factories.get(name) {
            Some(factory) => Ok(VoiceSlot::new(name, factory())),
            None => Err(SceneError::UnknownVoiceType(name.to_owned())),
        }
    }
}
