//! Positioned sine blip.
//!
//! The [`SineBlip`] with a scene placement attached. Placement arrives as
//! the eight trailing trigger fields (position, orientation quaternion,
//! size) and attenuates the output by distance from the origin.

use crate::audio::AudioView;
use crate::error::SceneError;
use crate::spatial::{Pose, SpatialParams};
use crate::synth::{ParamField, SynthVoice};
use crate::voices::SineBlip;

/// A [`SineBlip`] placed in the scene.
///
/// Trigger fields: the blip's frequency, amplitude and duration, followed
/// by the eight placement fields.
pub struct PositionedBlip {
    blip: SineBlip,
    spatial: SpatialParams,
}

impl PositionedBlip {
    pub fn new() -> Self {
        Self {
            blip: SineBlip::new(),
            spatial: SpatialParams::default(),
        }
    }

    pub fn pose(&self) -> Pose {
        self.spatial.pose
    }

    pub fn size(&self) -> f32 {
        self.spatial.size
    }

    fn attenuation(&self) -> f32 {
        let [x, y, z] = self.spatial.pose.position;
        let distance = (x * x + y * y + z * z).sqrt();
        1.0 / (1.0 + distance)
    }
}

impl Default for PositionedBlip {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthVoice for PositionedBlip {
    fn on_trigger_on(&mut self) {
        self.blip.on_trigger_on();
    }

    fn on_trigger_off(&mut self) {
        self.blip.on_trigger_off();
    }

    fn on_process(&mut self, audio: &mut AudioView) {
        let gain = self.attenuation();
        self.blip.render(audio, gain);
    }

    fn set_trigger_params(&mut self, fields: &[ParamField]) -> Result<(), SceneError> {
        // Parse the placement into a scratch copy first, so a bad base
        // field list leaves the placement untouched too.
        let mut spatial = self.spatial;
        let base = spatial.apply_trailing_fields(fields)?;
        self.blip.set_trigger_params(base)?;
        self.spatial = spatial;
        Ok(())
    }

    fn get_trigger_params(&self) -> Vec<ParamField> {
        let mut fields = self.blip.get_trigger_params();
        fields.extend(self.spatial.to_fields());
        fields
    }

    fn is_done(&self) -> bool {
        self.blip.is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(values: &[f32]) -> Vec<ParamField> {
        values.iter().copied().map(ParamField::Float).collect()
    }

    #[test]
    fn base_and_placement_fields_round_trip() {
        let mut voice = PositionedBlip::new();
        let all = fields(&[220.0, 0.4, 1.0, 1.0, 2.0, 3.0, 1.0, 0.0, 0.0, 0.0, 0.5]);
        voice.set_trigger_params(&all).unwrap();
        assert_eq!(voice.pose().position, [1.0, 2.0, 3.0]);
        assert_eq!(voice.size(), 0.5);
        assert_eq!(voice.get_trigger_params(), all);
    }

    #[test]
    fn short_field_list_leaves_everything_unchanged() {
        let mut voice = PositionedBlip::new();
        let before = voice.get_trigger_params();
        assert!(voice.set_trigger_params(&fields(&[220.0, 0.4])).is_err());
        assert_eq!(voice.get_trigger_params(), before);
    }

    #[test]
    fn bad_base_fields_leave_placement_unchanged() {
        let mut voice = PositionedBlip::new();
        // Eight placement fields but only two base fields.
        let bad = fields(&[220.0, 0.4, 1.0, 2.0, 3.0, 1.0, 0.0, 0.0, 0.0, 0.5]);
        assert!(voice.set_trigger_params(&bad).is_err());
        assert_eq!(voice.pose(), Pose::default());
    }

    #[test]
    fn distance_attenuates_output() {
        let near = PositionedBlip::new();
        let mut far = PositionedBlip::new();
        far.spatial.pose.position = [3.0, 0.0, 0.0];
        assert!(far.attenuation() < near.attenuation());
        assert_eq!(near.attenuation(), 1.0);
    }
}
