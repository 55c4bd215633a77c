//! Timed events on the sequencer's timeline.

use crate::synth::{ParamField, VoiceId, VoiceSlot};

/// What an event does when its start time elapses.
pub enum EventKind {
    /// Trigger a pre-allocated voice (from a `+` directive). The slot is
    /// consumed when the event fires.
    Voice(Option<VoiceSlot>),
    /// Acquire a voice of the named type, apply the fields, trigger it
    /// (from an `@` directive).
    PFields {
        name: String,
        fields: Vec<ParamField>,
    },
    /// Tempo change. Parsed and kept on the timeline; tempo scaling is
    /// applied at parse time, so dispatch is a no-op.
    Tempo(f64),
}

/// One entry in the sorted event timeline.
pub struct SynthSequencerEvent {
    /// Absolute start time in seconds of master time.
    pub start_time: f64,
    /// Event length in seconds. `None` marks an open duration, closed later
    /// by a matching `-` directive or never.
    pub duration: Option<f64>,
    pub kind: EventKind,
    /// Sub-block offset in frames computed at dispatch.
    pub offset_counter: i64,
    /// Id of the voice this event triggered. Cleared when the matching
    /// turn-off has been issued, so an event turns off at most once.
    pub(crate) triggered: Option<VoiceId>,
}

impl SynthSequencerEvent {
    pub fn new(start_time: f64, duration: Option<f64>, kind: EventKind) -> Self {
        Self {
            start_time,
            duration,
            kind,
            offset_counter: 0,
            triggered: None,
        }
    }

    /// Id of the owned voice, for events that still hold one.
    pub fn voice_id(&self) -> Option<VoiceId> {
        match &self.kind {
            EventKind::Voice(Some(slot)) => Some(slot.id()),
            _ => None,
        }
    }

    /// Whether this event has triggered a voice that has not yet been
    /// turned off.
    pub fn is_playing(&self) -> bool {
        self.triggered.is_some()
    }
}
