//! Three-axis rotation of a single articulation.

use std::fmt;

use serde_json::Value;

use crate::error::ReBaseError;
use crate::wire::number_value;

/// Rotation around the x, y and z axes. Missing components read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Rotation {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// The `[x, y, z]` wire form.
    pub fn to_value(&self) -> Value {
        Value::Array(self.to_array().into_iter().map(number_value).collect())
    }
}

impl From<[f64; 3]> for Rotation {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl TryFrom<&Value> for Rotation {
    type Error = ReBaseError;

    /// Accepts a three-element list of numbers; `null` components become zero.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let invalid = || ReBaseError::InvalidRotation(value.clone());
        let items = value.as_array().filter(|a| a.len() == 3).ok_or_else(invalid)?;
        let mut components = [0.0; 3];
        for (slot, item) in components.iter_mut().zip(items) {
            *slot = match item {
                Value::Null => 0.0,
                other => other.as_f64().ok_or_else(invalid)?,
            };
        }
        Ok(Self::from(components))
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}]",
            round4(self.x),
            round4(self.y),
            round4(self.z)
        )
    }
}

fn round4(value: f64) -> f64 {
    // Adding zero folds -0 into 0.
    (value * 10_000.0).round() / 10_000.0 + 0.0
}
