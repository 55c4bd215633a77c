//! Ready-made voices.
//!
//! Small, self-contained [`SynthVoice`](crate::synth::SynthVoice)
//! implementations to get a scene sounding, and to study as starting points
//! for your own voices.
//!
//! # Example
//!
//! ```ignore
//! use polyscene::voices::SineBlip;
//!
//! synth.register_voice("SineBlip", SineBlip::new);
//! ```

mod blip;
mod positioned;

pub use blip::SineBlip;
pub use positioned::PositionedBlip;
