//! One captured frame: a rotation per articulation.
//!
//! # Design
//! Articulations keep insertion order, since a movement compares its own
//! articulation list against each register's element by element. A slot may
//! hold no rotation yet (`None`) until the caller assigns one.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::ReBaseError;
use crate::rotation::Rotation;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Register {
    entries: Vec<(String, Option<Rotation>)>,
}

impl Register {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a register with a zero rotation for every name.
    ///
    /// Fails with `RepeatedArticulation` when a name appears twice.
    pub fn from_articulations<I, S>(names: I) -> Result<Self, ReBaseError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut register = Self::new();
        for name in &names {
            if register.contains(name) {
                return Err(ReBaseError::RepeatedArticulation {
                    articulation: name.clone(),
                    list: names.clone(),
                });
            }
            register.entries.push((name.clone(), Some(Rotation::ZERO)));
        }
        Ok(register)
    }

    /// Build a register from `name -> [x, y, z] | null`.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ReBaseError> {
        let mut register = Self::new();
        for (name, value) in map {
            register.set_value(name.clone(), value)?;
        }
        Ok(register)
    }

    /// Rotation of `articulation`, or `None` when absent or not yet assigned.
    pub fn get(&self, articulation: &str) -> Option<&Rotation> {
        self.entries
            .iter()
            .find(|(name, _)| name == articulation)
            .and_then(|(_, rotation)| rotation.as_ref())
    }

    pub fn contains(&self, articulation: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == articulation)
    }

    /// Assign a rotation, appending the articulation if it is new.
    pub fn set(&mut self, articulation: impl Into<String>, rotation: impl Into<Option<Rotation>>) {
        let articulation = articulation.into();
        let rotation = rotation.into();
        match self.entries.iter_mut().find(|(name, _)| *name == articulation) {
            Some(entry) => entry.1 = rotation,
            None => self.entries.push((articulation, rotation)),
        }
    }

    /// Like `set`, coercing a raw `[x, y, z]` or `null`.
    pub fn set_value(&mut self, articulation: impl Into<String>, value: &Value) -> Result<(), ReBaseError> {
        let rotation = match value {
            Value::Null => None,
            other => Some(Rotation::try_from(other)?),
        };
        self.set(articulation, rotation);
        Ok(())
    }

    pub fn articulation_count(&self) -> usize {
        self.entries.len()
    }

    pub fn articulations(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Rotation>)> {
        self.entries
            .iter()
            .map(|(name, rotation)| (name.as_str(), rotation.as_ref()))
    }

    pub fn to_dict(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(name, rotation)| {
                let value = rotation.as_ref().map_or(Value::Null, Rotation::to_value);
                (name.clone(), value)
            })
            .collect()
    }
}

impl TryFrom<&Value> for Register {
    type Error = ReBaseError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Self::from_map(map),
            Value::Array(items) => {
                let names = items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| ReBaseError::InvalidRegister(value.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::from_articulations(names)
            }
            other => Err(ReBaseError::InvalidRegister(other.clone())),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, rotation)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match rotation {
                Some(rotation) => write!(f, "{name}: {rotation}")?,
                None => write!(f, "{name}: None")?,
            }
        }
        f.write_str("}")
    }
}
