//! A session: a group of movements plus patient and medical context.
//!
//! Patient and medical fields arrive either flat (`patientAge`) or nested
//! (`patient.age`). When both are present the flat key wins; the nested one
//! is only read when the flat key is absent. They are always written nested.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ReBaseError;
use crate::movement::{self, Movement};
use crate::schema::{Field, FieldKind, Schema};
use crate::types::Id;
use crate::wire::{count_value, exclude_keys, number_value};

const PATIENT_FIELDS: &[Field] = &[
    Field::new("id", FieldKind::Id),
    Field::new("age", FieldKind::Number),
    Field::new("height", FieldKind::Number),
    Field::new("weight", FieldKind::Number),
];

const MEDICAL_FIELDS: &[Field] = &[
    Field::new("mainComplaint", FieldKind::Text),
    Field::new("historyOfCurrentDisease", FieldKind::Text),
    Field::new("historyOfPastDisease", FieldKind::Text),
    Field::new("diagnosis", FieldKind::Text),
    Field::new("relatedDiseases", FieldKind::Text),
    Field::new("medications", FieldKind::Text),
    Field::new("physicalEvaluation", FieldKind::Text),
];

const FIELDS: &[Field] = &[
    Field::new("id", FieldKind::Id),
    Field::new("_id", FieldKind::Id),
    Field::new("title", FieldKind::Text),
    Field::new("description", FieldKind::Text),
    Field::new("professionalId", FieldKind::Id),
    Field::new("patientSessionNumber", FieldKind::Number),
    Field::new("insertionDate", FieldKind::Text),
    Field::new("updateDate", FieldKind::Text),
    Field::new("patientId", FieldKind::Id),
    Field::new("patientAge", FieldKind::Number),
    Field::new("patientHeight", FieldKind::Number),
    Field::new("patientWeight", FieldKind::Number),
    Field::new("mainComplaint", FieldKind::Text),
    Field::new("historyOfCurrentDisease", FieldKind::Text),
    Field::new("historyOfPastDisease", FieldKind::Text),
    Field::new("diagnosis", FieldKind::Text),
    Field::new("relatedDiseases", FieldKind::Text),
    Field::new("medications", FieldKind::Text),
    Field::new("physicalEvaluation", FieldKind::Text),
    Field::new("numberOfMovements", FieldKind::Number),
    Field::new("movements", FieldKind::List),
    Field::new("movementIds", FieldKind::List),
    Field::new("patient", FieldKind::Object(PATIENT_FIELDS)),
    Field::new("medicalData", FieldKind::Object(MEDICAL_FIELDS)),
];

pub const SESSION_SCHEMA: Schema = Schema::new("Session", FIELDS);

const WRITE_EXCLUDE: &[&str] = &["id", "insertionDate", "updateDate", "movementIds"];
const UPDATE_EXCLUDE: &[&str] = &["movements", "numberOfMovements"];

/// Medical text fields; the flat key, the `medicalData` key and the wire
/// name are the same.
const MEDICAL_KEYS: [&str; 7] = [
    "mainComplaint",
    "historyOfCurrentDisease",
    "historyOfPastDisease",
    "diagnosis",
    "relatedDiseases",
    "medications",
    "physicalEvaluation",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub id: Option<Id>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub professional_id: Option<Id>,
    pub patient_session_number: Option<f64>,
    pub insertion_date: Option<String>,
    pub update_date: Option<String>,
    pub patient_id: Option<Id>,
    pub patient_age: Option<f64>,
    pub patient_height: Option<f64>,
    pub patient_weight: Option<f64>,
    pub main_complaint: Option<String>,
    pub history_of_current_disease: Option<String>,
    pub history_of_past_disease: Option<String>,
    pub diagnosis: Option<String>,
    pub related_diseases: Option<String>,
    pub medications: Option<String>,
    pub physical_evaluation: Option<String>,
    pub number_of_movements: Option<usize>,
    pub movement_ids: Vec<Id>,
    pub movements: Vec<Movement>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a session from its wire mapping, coercing `movements` entries
    /// into `Movement` values.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ReBaseError> {
        SESSION_SCHEMA.validate(map)?;

        let patient = map.get("patient").and_then(Value::as_object);
        let medical = map.get("medicalData").and_then(Value::as_object);
        let patient_field = |flat: &str, key: &str| lookup(map, flat, patient, key);
        let medical_text = |key: &str| {
            lookup(map, key, medical, key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
        let id = |key: &str| map.get(key).and_then(Id::from_value);

        let [main_complaint, history_of_current_disease, history_of_past_disease, diagnosis, related_diseases, medications, physical_evaluation] =
            MEDICAL_KEYS.map(medical_text);

        let movements = match map.get("movements") {
            Some(Value::Array(items)) => items
                .iter()
                .map(Movement::try_from)
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        let movement_ids = match map.get("movementIds") {
            Some(value @ Value::Array(items)) => items
                .iter()
                .map(|item| {
                    Id::from_value(item).ok_or_else(|| ReBaseError::InappropriateValue {
                        entity: SESSION_SCHEMA.entity,
                        attribute: "movementIds".to_string(),
                        value: value.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        Ok(Self {
            id: id("id").or_else(|| id("_id")),
            title: text("title"),
            description: text("description"),
            professional_id: id("professionalId"),
            patient_session_number: map.get("patientSessionNumber").and_then(Value::as_f64),
            insertion_date: text("insertionDate"),
            update_date: text("updateDate"),
            patient_id: patient_field("patientId", "id").and_then(Id::from_value),
            patient_age: patient_field("patientAge", "age").and_then(Value::as_f64),
            patient_height: patient_field("patientHeight", "height").and_then(Value::as_f64),
            patient_weight: patient_field("patientWeight", "weight").and_then(Value::as_f64),
            main_complaint,
            history_of_current_disease,
            history_of_past_disease,
            diagnosis,
            related_diseases,
            medications,
            physical_evaluation,
            number_of_movements: map.get("numberOfMovements").and_then(count_value),
            movement_ids,
            movements,
        })
    }

    /// Sum of the contained movements' durations; movements without a
    /// duration count as zero.
    pub fn duration(&self) -> f64 {
        self.movements
            .iter()
            .map(|m| m.duration.unwrap_or(0.0))
            .sum()
    }

    pub fn to_dict(&self) -> Map<String, Value> {
        self.to_dict_excluding(&[], &[])
    }

    /// `to_dict` with `exclude` dropped from the session and
    /// `movement_exclude` dropped from every embedded movement.
    pub fn to_dict_excluding(&self, exclude: &[&str], movement_exclude: &[&str]) -> Map<String, Value> {
        let mut dict = Map::new();
        insert(&mut dict, "id", self.id.as_ref().map(Id::to_value));
        insert(&mut dict, "title", self.title.clone().map(Value::String));
        insert(&mut dict, "description", self.description.clone().map(Value::String));
        insert(&mut dict, "professionalId", self.professional_id.as_ref().map(Id::to_value));
        insert(&mut dict, "patientSessionNumber", self.patient_session_number.map(number_value));
        insert(&mut dict, "insertionDate", self.insertion_date.clone().map(Value::String));
        insert(&mut dict, "updateDate", self.update_date.clone().map(Value::String));

        let mut patient = Map::new();
        insert(&mut patient, "id", self.patient_id.as_ref().map(Id::to_value));
        insert(&mut patient, "age", self.patient_age.map(number_value));
        insert(&mut patient, "height", self.patient_height.map(number_value));
        insert(&mut patient, "weight", self.patient_weight.map(number_value));
        if !patient.is_empty() {
            dict.insert("patient".to_string(), Value::Object(patient));
        }

        let mut medical = Map::new();
        for (key, value) in MEDICAL_KEYS.iter().zip(self.medical_texts()) {
            insert(&mut medical, key, value.cloned().map(Value::String));
        }
        if !medical.is_empty() {
            dict.insert("medicalData".to_string(), Value::Object(medical));
        }

        insert(&mut dict, "numberOfMovements", self.number_of_movements.map(Value::from));
        if !self.movements.is_empty() {
            let movements = self
                .movements
                .iter()
                .map(|m| Value::Object(m.to_dict_excluding(movement_exclude)))
                .collect();
            dict.insert("movements".to_string(), Value::Array(movements));
        }
        if !self.movement_ids.is_empty() {
            let ids = self.movement_ids.iter().map(Id::to_value).collect();
            dict.insert("movementIds".to_string(), Value::Array(ids));
        }

        exclude_keys(&mut dict, exclude);
        dict
    }

    /// Request body for an insert (`update == false`) or an update. An
    /// update never resends the movement collection.
    pub fn to_json(&self, update: bool) -> Result<String, ReBaseError> {
        let mut exclude = WRITE_EXCLUDE.to_vec();
        if update {
            exclude.extend_from_slice(UPDATE_EXCLUDE);
        }
        let movement_exclude = movement::write_exclusions(update);
        let body = serde_json::json!({
            "session": self.to_dict_excluding(&exclude, &movement_exclude)
        });
        serde_json::to_string(&body).map_err(|e| ReBaseError::Serialization(e.to_string()))
    }

    fn medical_texts(&self) -> [Option<&String>; 7] {
        [
            self.main_complaint.as_ref(),
            self.history_of_current_disease.as_ref(),
            self.history_of_past_disease.as_ref(),
            self.diagnosis.as_ref(),
            self.related_diseases.as_ref(),
            self.medications.as_ref(),
            self.physical_evaluation.as_ref(),
        ]
    }
}

/// Read `flat` from the top level, falling back to `key` in `nested`.
fn lookup<'a>(
    map: &'a Map<String, Value>,
    flat: &str,
    nested: Option<&'a Map<String, Value>>,
    key: &str,
) -> Option<&'a Value> {
    map.get(flat).or_else(|| nested.and_then(|object| object.get(key)))
}

fn insert(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

impl TryFrom<&Value> for Session {
    type Error = ReBaseError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(ReBaseError::InappropriateValue {
                entity: SESSION_SCHEMA.entity,
                attribute: "session".to_string(),
                value: other.clone(),
            }),
        }
    }
}

impl Serialize for Session {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_dict().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Session {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Session::try_from(&value).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.to_dict()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(value: Value) -> Result<Session, ReBaseError> {
        Session::try_from(&value)
    }

    #[test]
    fn reads_scalar_fields() {
        let s = session(json!({ "title": "Test", "id": 1 })).unwrap();
        assert_eq!(s.title.as_deref(), Some("Test"));
        assert_eq!(s.id, Some(Id::from(1u64)));
        assert!(s.movements.is_empty());
    }

    #[test]
    fn rejects_invalid_mappings() {
        for input in [
            json!({ "title": "Test", "invalid": "key", "id": 1 }),
            json!({ "title": 2, "id": {} }),
            json!({ "patient": "Joe" }),
            json!({ "patient": { "age": "invalid" } }),
            json!({ "patient": { "age": 20, "invalid": "key" } }),
            json!({ "medicalData": "None" }),
            json!({ "medicalData": { "diagnosis": 0 } }),
            json!({ "medicalData": { "diagnosis": "All right", "invalid": "key" } }),
            json!({ "movements": [{ "bogus": true }] }),
            json!({ "movementIds": ["", "x"] }),
        ] {
            assert!(session(input.clone()).is_err(), "accepted {input}");
        }
    }

    #[test]
    fn coerces_movement_mappings_and_sums_duration() {
        let s = session(json!({
            "title": "Test",
            "id": 1,
            "movements": [
                { "articulations": ["a1"], "registers": [{ "a1": [1, 2, 3] }], "duration": 10 },
                { "articulations": ["a1"], "registers": [{ "a1": [1, 2, 3] }], "duration": 2.5 }
            ]
        }))
        .unwrap();

        assert_eq!(s.movements.len(), 2);
        assert_eq!(s.movements[0].number_of_registers, Some(1));
        assert_eq!(s.duration(), 12.5);
    }

    #[test]
    fn empty_session_has_zero_duration() {
        assert_eq!(Session::new().duration(), 0.0);
    }

    #[test]
    fn flat_and_nested_forms_agree() {
        let flat = session(json!({
            "patientId": "Joe",
            "patientAge": 24,
            "patientHeight": 173,
            "patientWeight": 65,
            "mainComplaint": "Pain",
            "historyOfCurrentDisease": "Long",
            "historyOfPastDisease": "Longer",
            "diagnosis": "Bad.",
            "relatedDiseases": "All of them",
            "medications": "Same",
            "physicalEvaluation": "Badder."
        }))
        .unwrap();
        let nested = session(json!({
            "patient": { "id": "Joe", "age": 24, "height": 173, "weight": 65 },
            "medicalData": {
                "mainComplaint": "Pain",
                "historyOfCurrentDisease": "Long",
                "historyOfPastDisease": "Longer",
                "diagnosis": "Bad.",
                "relatedDiseases": "All of them",
                "medications": "Same",
                "physicalEvaluation": "Badder."
            }
        }))
        .unwrap();

        assert_eq!(flat, nested);
        assert_eq!(flat.physical_evaluation.as_deref(), Some("Badder."));
        assert_eq!(flat.patient_age, Some(24.0));
    }

    #[test]
    fn flat_key_wins_over_nested() {
        let s = session(json!({ "patientId": "flat", "patient": { "id": "nested", "age": 3 } })).unwrap();
        assert_eq!(s.patient_id, Some(Id::from("flat")));
        assert_eq!(s.patient_age, Some(3.0));
    }

    #[test]
    fn conversions() {
        let s = session(json!({
            "id": "0",
            "title": "test",
            "patientId": "foo",
            "movements": [{ "label": "move" }]
        }))
        .unwrap();

        assert_eq!(
            Value::Object(s.to_dict()),
            json!({
                "id": "0",
                "title": "test",
                "patient": { "id": "foo" },
                "movements": [{ "label": "move" }]
            })
        );

        let insert: Value = serde_json::from_str(&s.to_json(false).unwrap()).unwrap();
        assert_eq!(
            insert,
            json!({ "session": {
                "title": "test",
                "patient": { "id": "foo" },
                "movements": [{ "label": "move" }]
            }})
        );

        let update: Value = serde_json::from_str(&s.to_json(true).unwrap()).unwrap();
        assert_eq!(
            update,
            json!({ "session": { "title": "test", "patient": { "id": "foo" } } })
        );
    }

    #[test]
    fn embedded_movements_follow_write_exclusions() {
        let s = session(json!({
            "title": "t",
            "numberOfMovements": 1,
            "movementIds": ["m1"],
            "movements": [{
                "id": "m1",
                "label": "walk",
                "fps": 10,
                "patientId": "p",
                "articulations": ["a1"],
                "registers": [{ "a1": [1, 2, 3] }]
            }]
        }))
        .unwrap();

        let insert: Value = serde_json::from_str(&s.to_json(false).unwrap()).unwrap();
        assert_eq!(
            insert,
            json!({ "session": {
                "title": "t",
                "numberOfMovements": 1,
                "movements": [{
                    "label": "walk",
                    "fps": 10,
                    "duration": 0.1,
                    "numberOfRegisters": 1,
                    "registers": [{ "a1": [1, 2, 3] }]
                }]
            }})
        );
        assert_eq!(s.to_dict()["movementIds"], json!(["m1"]));
    }

    #[test]
    fn dict_round_trips() {
        let s = session(json!({
            "_id": "s1",
            "title": "t",
            "description": "d",
            "professionalId": "pro",
            "patientSessionNumber": 3,
            "insertionDate": "2024-01-01",
            "patientId": "pt",
            "patientWeight": 70.5,
            "diagnosis": "ok",
            "numberOfMovements": 1,
            "movementIds": ["m1"],
            "movements": [{ "id": "m1", "articulations": ["a"], "registers": [{ "a": [0, 0, 1] }] }]
        }))
        .unwrap();

        let first = s.to_dict();
        let again = Session::from_map(&first).unwrap();
        assert_eq!(again.to_dict(), first);
        assert_eq!(again, s);
    }
}
