//! A captured movement: registers sharing one articulation list.
//!
//! # Design
//! Every register stored in a movement has exactly the movement's
//! `articulations`, in the same order. The first register adopts its list
//! when the movement has none. `number_of_registers` and `duration` are
//! derived: they change only through `set_registers` and `add_register`,
//! which keep them consistent with the register sequence and `fps`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ReBaseError;
use crate::register::Register;
use crate::schema::{string_list, Field, FieldKind, Schema};
use crate::types::Id;
use crate::wire::{count_value, exclude_keys, number_value};

const APP_FIELDS: &[Field] = &[
    Field::new("code", FieldKind::Id),
    Field::new("data", FieldKind::Any),
];

const FIELDS: &[Field] = &[
    Field::new("id", FieldKind::Id),
    Field::new("_id", FieldKind::Id),
    Field::new("label", FieldKind::Text),
    Field::new("description", FieldKind::Text),
    Field::new("device", FieldKind::Text),
    Field::new("articulations", FieldKind::List),
    Field::new("fps", FieldKind::Number),
    Field::new("duration", FieldKind::Number),
    Field::new("numberOfRegisters", FieldKind::Number),
    Field::new("insertionDate", FieldKind::Text),
    Field::new("updateDate", FieldKind::Text),
    Field::new("sessionId", FieldKind::Id),
    Field::new("professionalId", FieldKind::Id),
    Field::new("patientId", FieldKind::Id),
    Field::new("appCode", FieldKind::Id),
    Field::new("appData", FieldKind::Any),
    Field::new("registers", FieldKind::List),
    Field::new("app", FieldKind::Object(APP_FIELDS)),
];

pub const MOVEMENT_SCHEMA: Schema = Schema::new("Movement", FIELDS);

/// Fields the server assigns or derives and never accepts on a write.
pub(crate) const WRITE_EXCLUDE: &[&str] = &[
    "id",
    "insertionDate",
    "updateDate",
    "professionalId",
    "patientId",
    "articulations",
];

/// Additionally dropped on updates: structural and derived fields.
pub(crate) const UPDATE_EXCLUDE: &[&str] = &["numberOfRegisters", "duration", "registers"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Movement {
    pub id: Option<Id>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub device: Option<String>,
    pub articulations: Option<Vec<String>>,
    pub fps: Option<f64>,
    pub duration: Option<f64>,
    pub number_of_registers: Option<usize>,
    pub insertion_date: Option<String>,
    pub update_date: Option<String>,
    pub session_id: Option<Id>,
    pub professional_id: Option<Id>,
    pub patient_id: Option<Id>,
    pub app_code: Option<Id>,
    pub app_data: Option<Value>,
    registers: Vec<Register>,
}

impl Movement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a movement from its wire mapping.
    ///
    /// Unknown keys and wrongly typed values are rejected before anything is
    /// read. When `registers` is present each element is coerced and checked
    /// against `articulations`; the derived fields are then computed unless
    /// `numberOfRegisters` was supplied.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ReBaseError> {
        MOVEMENT_SCHEMA.validate(map)?;

        let app = map.get("app").and_then(Value::as_object);
        let id_field = |key: &str| map.get(key).and_then(Id::from_value);
        let text_field = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
        let number_field = |key: &str| map.get(key).and_then(Value::as_f64);

        let mut movement = Self {
            id: id_field("id").or_else(|| id_field("_id")),
            label: text_field("label"),
            description: text_field("description"),
            device: text_field("device"),
            articulations: map
                .get("articulations")
                .map(|value| string_list(MOVEMENT_SCHEMA.entity, "articulations", value))
                .transpose()?,
            fps: number_field("fps"),
            duration: number_field("duration"),
            number_of_registers: map.get("numberOfRegisters").and_then(count_value),
            insertion_date: text_field("insertionDate"),
            update_date: text_field("updateDate"),
            session_id: id_field("sessionId"),
            professional_id: id_field("professionalId"),
            patient_id: id_field("patientId"),
            app_code: id_field("appCode")
                .or_else(|| app.and_then(|a| a.get("code")).and_then(Id::from_value)),
            app_data: map
                .get("appData")
                .or_else(|| app.and_then(|a| a.get("data")))
                .cloned(),
            registers: Vec::new(),
        };

        if let Some(Value::Array(items)) = map.get("registers") {
            let registers = items
                .iter()
                .map(Register::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            let explicit_count = movement.number_of_registers.is_some();
            movement.registers = movement.conform(registers)?;
            if !explicit_count {
                movement.update_derived(movement.registers.len());
            }
        }

        Ok(movement)
    }

    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    /// Replace the whole register sequence.
    ///
    /// Every register is checked before anything changes, so a mismatch
    /// leaves the movement untouched.
    pub fn set_registers(&mut self, registers: Vec<Register>) -> Result<(), ReBaseError> {
        let articulations = self.articulations.clone();
        match self.conform(registers) {
            Ok(registers) => {
                let count = registers.len();
                self.registers = registers;
                self.update_derived(count);
                Ok(())
            }
            Err(err) => {
                self.articulations = articulations;
                Err(err)
            }
        }
    }

    /// Append one register, adopting its articulation list if this movement
    /// has none and holds no registers yet.
    pub fn add_register(&mut self, register: Register) -> Result<(), ReBaseError> {
        if self.articulations.is_none() && self.registers.is_empty() {
            self.articulations = Some(register.articulations());
        } else {
            self.check_articulations(&register)?;
        }
        self.registers.push(register);
        let count = self.number_of_registers.map_or(1, |n| n + 1);
        self.update_derived(count);
        Ok(())
    }

    /// Ordered wire mapping of every present field.
    pub fn to_dict(&self) -> Map<String, Value> {
        self.to_dict_excluding(&[])
    }

    /// `to_dict` with the given wire keys dropped after assembly.
    pub fn to_dict_excluding(&self, exclude: &[&str]) -> Map<String, Value> {
        let mut dict = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                dict.insert(key.to_string(), value);
            }
        };

        put("id", self.id.as_ref().map(Id::to_value));
        put("label", self.label.clone().map(Value::String));
        put("description", self.description.clone().map(Value::String));
        put("device", self.device.clone().map(Value::String));
        put(
            "articulations",
            self.articulations
                .as_ref()
                .map(|list| Value::from(list.clone())),
        );
        put("fps", self.fps.map(number_value));
        put("duration", self.duration.map(number_value));
        put("numberOfRegisters", self.number_of_registers.map(Value::from));
        put("insertionDate", self.insertion_date.clone().map(Value::String));
        put("updateDate", self.update_date.clone().map(Value::String));
        put("sessionId", self.session_id.as_ref().map(Id::to_value));
        put("professionalId", self.professional_id.as_ref().map(Id::to_value));
        put("patientId", self.patient_id.as_ref().map(Id::to_value));

        if self.app_code.is_some() || self.app_data.is_some() {
            let mut app = Map::new();
            if let Some(code) = &self.app_code {
                app.insert("code".to_string(), code.to_value());
            }
            if let Some(data) = &self.app_data {
                app.insert("data".to_string(), data.clone());
            }
            put("app", Some(Value::Object(app)));
        }

        if !self.registers.is_empty() {
            let registers = self
                .registers
                .iter()
                .map(|r| Value::Object(r.to_dict()))
                .collect();
            put("registers", Some(Value::Array(registers)));
        }

        exclude_keys(&mut dict, exclude);
        dict
    }

    /// Request body for an insert (`update == false`) or an update.
    pub fn to_json(&self, update: bool) -> Result<String, ReBaseError> {
        let body = serde_json::json!({ "movement": self.to_write_dict(update) });
        serde_json::to_string(&body).map_err(|e| ReBaseError::Serialization(e.to_string()))
    }

    pub(crate) fn to_write_dict(&self, update: bool) -> Map<String, Value> {
        self.to_dict_excluding(&write_exclusions(update))
    }

    /// Coerce a register batch to this movement's articulation list,
    /// adopting the first register's list when none is set.
    fn conform(&mut self, registers: Vec<Register>) -> Result<Vec<Register>, ReBaseError> {
        for register in &registers {
            if self.articulations.is_none() {
                self.articulations = Some(register.articulations());
            } else {
                self.check_articulations(register)?;
            }
        }
        Ok(registers)
    }

    fn check_articulations(&self, register: &Register) -> Result<(), ReBaseError> {
        let found = register.articulations();
        match &self.articulations {
            Some(expected) if *expected == found => Ok(()),
            expected => Err(ReBaseError::MismatchedArticulations {
                expected: expected.clone(),
                found,
            }),
        }
    }

    fn update_derived(&mut self, number_of_registers: usize) {
        self.number_of_registers = Some(number_of_registers);
        if let Some(fps) = self.fps.filter(|fps| *fps != 0.0) {
            self.duration = Some(number_of_registers as f64 / fps);
        }
    }
}

pub(crate) fn write_exclusions(update: bool) -> Vec<&'static str> {
    let mut exclude = WRITE_EXCLUDE.to_vec();
    if update {
        exclude.extend_from_slice(UPDATE_EXCLUDE);
    }
    exclude
}

impl TryFrom<&Value> for Movement {
    type Error = ReBaseError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(ReBaseError::InappropriateValue {
                entity: MOVEMENT_SCHEMA.entity,
                attribute: "movement".to_string(),
                value: other.clone(),
            }),
        }
    }
}

impl Serialize for Movement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_dict().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Movement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Movement::try_from(&value).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.to_dict()))
    }
}
