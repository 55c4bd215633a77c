//! Per-frame context passed to voices on the graphics path.
//!
//! Window and GL state live outside this crate; voices receive only the
//! frame timing they need to animate. Consumers that draw keep their own
//! rendering handles and read voice state from their `SynthVoice` impls.

/// Timing information for one graphics frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphicsContext {
    /// Frame counter since the scene started.
    pub frame: u64,
    /// Seconds since the previous frame.
    pub dt: f64,
}

impl GraphicsContext {
    pub fn new(frame: u64, dt: f64) -> Self {
        Self { frame, dt }
    }

    /// Advance to the next frame with the given delta.
    pub fn tick(&mut self, dt: f64) {
        self.frame += 1;
        self.dt = dt;
    }
}
