//! Trigger parameter fields.
//!
//! A voice exposes its trigger-time parameters as a flat, ordered vector of
//! typed fields. Sequencer scripts and presets speak this protocol.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One positional value in a voice's trigger-parameter vector.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum ParamField {
    Float(f32),
    Int(i32),
    Str(String),
}

impl ParamField {
    /// Numeric value of the field, if it has one. Integers widen to `f32`.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ParamField::Float(v) => Some(*v),
            ParamField::Int(v) => Some(*v as f32),
            ParamField::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamField::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f32> for ParamField {
    fn from(v: f32) -> Self {
        ParamField::Float(v)
    }
}

impl From<i32> for ParamField {
    fn from(v: i32) -> Self {
        ParamField::Int(v)
    }
}

impl From<&str> for ParamField {
    fn from(v: &str) -> Self {
        ParamField::Str(v.to_owned())
    }
}

impl From<String> for ParamField {
    fn from(v: String) -> Self {
        ParamField::Str(v)
    }
}
