//! The voice trait and the scheduler-owned slot that wraps it.

use crate::audio::AudioView;
use crate::error::SceneError;
use crate::graphics::GraphicsContext;
use crate::synth::field::ParamField;

/// Identifier assigned to a voice when it is triggered.
///
/// Ids are monotonically assigned by the scheduler unless supplied by the
/// caller. `0` means "not yet assigned".
pub type VoiceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// In the free pool, available for reuse.
    Free,
    /// Triggered and rendering.
    Active,
    /// Off-trigger delivered, finishing its release.
    Releasing,
}

/// A unit of stateful audio/graphics behavior with an on/off lifecycle.
///
/// Implementations render sound in `on_process`, draw in
/// `on_process_graphics` and step simulation state in `update`. Only the
/// methods a voice actually needs have to be overridden; the rest default to
/// no-ops.
pub trait SynthVoice: Send {
    /// Called when the voice is triggered, before its first block.
    fn on_trigger_on(&mut self) {}

    /// Called when the voice is asked to stop. Voices with a release phase
    /// keep rendering until [`SynthVoice::is_done`] returns true.
    fn on_trigger_off(&mut self) {}

    /// Render audio into the view. The view already starts at the voice's
    /// sub-block offset.
    fn on_process(&mut self, _audio: &mut AudioView) {}

    /// Draw for one graphics frame.
    fn on_process_graphics(&mut self, _g: &mut GraphicsContext) {}

    /// Step internal simulation state by `dt` seconds.
    fn update(&mut self, _dt: f64) {}

    /// Apply a flat trigger-parameter vector. Must not modify any state when
    /// returning an error.
    fn set_trigger_params(&mut self, fields: &[ParamField]) -> Result<(), SceneError>;

    /// The current trigger-parameter vector, in the same order
    /// `set_trigger_params` expects.
    fn get_trigger_params(&self) -> Vec<ParamField>;

    /// True once the voice has finished sounding and can be reclaimed.
    fn is_done(&self) -> bool {
        false
    }
}

/// A pooled voice instance plus the lifecycle state the scheduler tracks
/// for it: id, type tag, activity and sub-block offset counters.
///
/// A slot lives in exactly one of the scheduler's collections at any time:
/// the free pool, the pending-insert queue or the active list. Moving the
/// owned slot between collections replaces the intrusive `next`-pointer
/// chaining a non-owning design would need.
pub struct VoiceSlot {
    id: VoiceId,
    type_name: String,
    state: VoiceState,
    on_offset_frames: i64,
    off_offset_frames: i64,
    voice: Box<dyn SynthVoice>,
}

impl VoiceSlot {
    pub fn new(type_name: impl Into<String>, voice: Box<dyn SynthVoice>) -> Self {
        Self {
            id: 0,
            type_name: type_name.into(),
            state: VoiceState::Free,
            on_offset_frames: 0,
            off_offset_frames: 0,
            voice,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn set_id(&mut self, id: VoiceId) {
        self.id = id;
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, VoiceState::Active | VoiceState::Releasing)
    }

    pub fn voice(&self) -> &dyn SynthVoice {
        self.voice.as_ref()
    }

    pub fn voice_mut(&mut self) -> &mut dyn SynthVoice {
        self.voice.as_mut()
    }

    pub fn set_trigger_params(&mut self, fields: &[ParamField]) -> Result<(), SceneError> {
        self.voice.set_trigger_params(fields)
    }

    pub fn get_trigger_params(&self) -> Vec<ParamField> {
        self.voice.get_trigger_params()
    }

    /// Mark the slot active, starting `offset_frames` into a future block.
    pub fn trigger_on(&mut self, offset_frames: i64) {
        self.on_offset_frames = offset_frames.max(0);
        self.off_offset_frames = 0;
        self.state = VoiceState::Active;
        self.voice.on_trigger_on();
    }

    /// Ask the voice to stop. A non-positive offset delivers the off-trigger
    /// immediately; a positive offset schedules it that many frames ahead,
    /// to be delivered by the audio path when the offset lands in a block.
    pub fn trigger_off(&mut self, offset_frames: i64) {
        if offset_frames > 0 {
            self.off_offset_frames = offset_frames;
        } else {
            self.deliver_trigger_off();
        }
    }

    /// Deliver the off-trigger now. One-shot: a releasing voice is not
    /// re-triggered.
    pub(crate) fn deliver_trigger_off(&mut self) {
        if self.state == VoiceState::Active {
            self.state = VoiceState::Releasing;
            self.voice.on_trigger_off();
        }
    }

    /// Current start offset; decrements by the block size and clamps at
    /// zero, so a voice scheduled blocks ahead arrives on the right block.
    pub(crate) fn take_start_offset(&mut self, frames_per_buffer: i64) -> i64 {
        let frames = self.on_offset_frames;
        self.on_offset_frames = (self.on_offset_frames - frames_per_buffer).max(0);
        frames
    }

    /// Current end offset, decremented the same way. Zero means no off is
    /// scheduled.
    pub(crate) fn take_end_offset(&mut self, frames_per_buffer: i64) -> i64 {
        let frames = self.off_offset_frames;
        self.off_offset_frames = (self.off_offset_frames - frames_per_buffer).max(0);
        frames
    }

    /// True when the voice has finished and the slot can go back to the pool.
    pub(crate) fn finished(&self) -> bool {
        self.voice.is_done()
    }

    /// Reset lifecycle state for the free pool. The id is kept so a recycled
    /// voice can be re-triggered under its previous id.
    pub(crate) fn reset(&mut self) {
        self.state = VoiceState::Free;
        self.on_offset_frames = 0;
        self.off_offset_frames = 0;
    }
}
