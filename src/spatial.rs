//! Spatial placement for positioned voices.
//!
//! A positioned voice appends its placement to its trigger fields: three
//! position components, four orientation quaternion components and a size,
//! always in that order and always all eight.

use crate::error::SceneError;
use crate::synth::ParamField;

/// Position and orientation of a voice in the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pose {
    pub position: [f32; 3],
    /// Unit quaternion, `[w, x, y, z]`.
    pub orientation: [f32; 4],
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            orientation: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// Placement state carried by a positioned voice.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpatialParams {
    pub pose: Pose,
    pub size: f32,
}

impl SpatialParams {
    /// Number of trailing trigger fields a positioned voice carries.
    pub const FIELD_COUNT: usize = 8;

    /// Apply the trailing placement fields, returning the leading base
    /// fields for the voice itself.
    ///
    /// All-or-nothing: when the field count is short or any placement field
    /// is non-numeric, the error is returned with `self` untouched.
    pub fn apply_trailing_fields<'a>(
        &mut self,
        fields: &'a [ParamField],
    ) -> Result<&'a [ParamField], SceneError> {
        if fields.len() < Self::FIELD_COUNT {
            return Err(SceneError::FieldCountMismatch {
                expected: Self::FIELD_COUNT,
                got: fields.len(),
            });
        }
        let split = fields.len() - Self::FIELD_COUNT;
        let (base, trailing) = fields.split_at(split);

        let mut values = [0.0f32; Self::FIELD_COUNT];
        for (value, field) in values.iter_mut().zip(trailing) {
            *value = field.as_f32().ok_or(SceneError::FieldCountMismatch {
                expected: Self::FIELD_COUNT,
                got: split,
            })?;
        }

        self.pose.position = [values[0], values[1], values[2]];
        self.pose.orientation = [values[3], values[4], values[5], values[6]];
        self.size = values[7];
        Ok(base)
    }

    /// The placement as trigger fields, for appending to a voice's base
    /// fields.
    pub fn to_fields(&self) -> Vec<ParamField> {
        let [x, y, z] = self.pose.position;
        let [qw, qx, qy, qz] = self.pose.orientation;
        [x, y, z, qw, qx, qy, qz, self.size]
            .into_iter()
            .map(ParamField::Float)
            .collect()
    }
}
