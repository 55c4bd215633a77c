pub mod audio;
pub mod error;
pub mod graphics;
pub mod preset;
pub mod sequencer;
pub mod spatial;
pub mod synth; // Voice lifecycle, pooling and the block scheduler
pub mod time;
pub mod voices; // Ready-made voices for tests, benches and quick sketches

pub use error::SceneError;
pub use sequencer::SynthSequencer;
pub use synth::{PolySynth, SynthHandle, SynthVoice, VoiceId};
pub use time::TimeMasterMode;

/// File extension for sequencer scripts.
pub const SEQUENCE_EXTENSION: &str = ".synthSequence";
/// File extension for preset files.
pub const PRESET_EXTENSION: &str = ".preset";
/// File extension for preset map files.
pub const PRESET_MAP_EXTENSION: &str = ".presetMap";
