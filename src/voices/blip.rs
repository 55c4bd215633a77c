//! Sine blip voice.
//!
//! A sine oscillator with a linear amplitude decay over a fixed duration.
//! The simplest voice that exercises the full trigger lifecycle: it sounds
//! when triggered, fades on its own, and reports itself done so the
//! scheduler can reclaim it.

use std::f32::consts::TAU;

use crate::audio::AudioView;
use crate::error::SceneError;
use crate::synth::{ParamField, SynthVoice};

/// A decaying sine tone.
///
/// Trigger fields, in order: frequency in Hz, amplitude, duration in
/// seconds.
pub struct SineBlip {
    freq: f32,
    amp: f32,
    dur: f32,
    phase: f32,
    elapsed_frames: u64,
    finished: bool,
    released: bool,
}

impl SineBlip {
    pub fn new() -> Self {
        Self {
            freq: 440.0,
            amp: 0.3,
            dur: 0.5,
            phase: 0.0,
            elapsed_frames: 0,
            finished: false,
            released: false,
        }
    }

    /// Render into the view with an extra gain factor, shared with the
    /// positioned variant.
    pub(crate) fn render(&mut self, audio: &mut AudioView, extra_gain: f32) {
        let sample_rate = audio.sample_rate();
        if sample_rate <= 0.0 {
            return;
        }
        let dur_frames = (self.dur * sample_rate) as u64;
        let phase_inc = self.freq / sample_rate;
        for frame in 0..audio.frames() {
            if self.elapsed_frames >= dur_frames {
                break;
            }
            let decay = 1.0 - self.elapsed_frames as f32 / dur_frames.max(1) as f32;
            let sample = (self.phase * TAU).sin() * self.amp * decay * extra_gain;
            audio.add_to_all(frame, sample);
            self.phase = (self.phase + phase_inc).fract();
            self.elapsed_frames += 1;
        }
        if self.elapsed_frames >= dur_frames {
            self.finished = true;
        }
    }
}

impl Default for SineBlip {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthVoice for SineBlip {
    fn on_trigger_on(&mut self) {
        self.phase = 0.0;
        self.elapsed_frames = 0;
        self.finished = false;
        self.released = false;
    }

    fn on_trigger_off(&mut self) {
        // No release tail; stop at the block boundary.
        self.released = true;
    }

    fn on_process(&mut self, audio: &mut AudioView) {
        self.render(audio, 1.0);
    }

    fn set_trigger_params(&mut self, fields: &[ParamField]) -> Result<(), SceneError> {
        let [freq, amp, dur] = fields else {
            return Err(SceneError::FieldCountMismatch {
                expected: 3,
                got: fields.len(),
            });
        };
        let (Some(freq), Some(amp), Some(dur)) = (freq.as_f32(), amp.as_f32(), dur.as_f32())
        else {
            return Err(SceneError::FieldCountMismatch {
                expected: 3,
                got: fields.len(),
            });
        };
        self.freq = freq;
        self.amp = amp;
        self.dur = dur;
        Ok(())
    }

    fn get_trigger_params(&self) -> Vec<ParamField> {
        vec![
            ParamField::Float(self.freq),
            ParamField::Float(self.amp),
            ParamField::Float(self.dur),
        ]
    }

    fn is_done(&self) -> bool {
        self.released || self.finished
    }
}
