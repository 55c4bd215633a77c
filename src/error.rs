use std::path::PathBuf;

use thiserror::Error;

/// Failure modes of the scene toolkit.
///
/// None of these are fatal: the render thread never raises, and every failure
/// path degrades to "this voice or event is skipped this block".
#[derive(Debug, Error)]
pub enum SceneError {
    /// The free pool had no matching voice and automatic allocation is
    /// disabled for the type.
    #[error("no voice available for type `{0}` (allocation disabled)")]
    NoVoiceAvailable(String),

    /// No factory has been registered under the requested type name.
    #[error("unknown voice type `{0}`")]
    UnknownVoiceType(String),

    /// A sequence or preset file could not be opened.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// A trigger parameter vector did not match the voice's field layout.
    /// The voice state is left unmodified.
    #[error("trigger parameter count mismatch: expected {expected}, got {got}")]
    FieldCountMismatch { expected: usize, got: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
