//! Allow-list validation of entity field mappings.
//!
//! # Design
//! Each entity declares its accepted fields once as a static `Schema`; one
//! routine walks an incoming mapping against it. Nested objects carry their
//! own field list and report failures with dotted names (`patient.age`).

use serde_json::{Map, Value};

use crate::error::ReBaseError;
use crate::types::Id;

/// The type predicate (or sub-schema) a field value must satisfy.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Non-empty string or non-zero number.
    Id,
    Text,
    /// Integer or float; booleans are not numbers.
    Number,
    List,
    Any,
    Object(&'static [Field]),
}

impl FieldKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Id => Id::from_value(value).is_some(),
            FieldKind::Text => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::List => value.is_array(),
            FieldKind::Any => true,
            FieldKind::Object(_) => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// The accepted field set of one entity.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub entity: &'static str,
    pub fields: &'static [Field],
}

impl Schema {
    pub const fn new(entity: &'static str, fields: &'static [Field]) -> Self {
        Self { entity, fields }
    }

    /// Fail on the first unknown key or wrongly typed value, in mapping order.
    pub fn validate(&self, map: &Map<String, Value>) -> Result<(), ReBaseError> {
        self.validate_fields(self.fields, map, None)
    }

    fn validate_fields(
        &self,
        fields: &'static [Field],
        map: &Map<String, Value>,
        prefix: Option<&str>,
    ) -> Result<(), ReBaseError> {
        for (key, value) in map {
            let attribute = match prefix {
                Some(prefix) => format!("{prefix}.{key}"),
                None => key.clone(),
            };
            let field = fields.iter().find(|f| f.name == key.as_str()).ok_or_else(|| {
                ReBaseError::InvalidAttribute {
                    entity: self.entity,
                    attribute: attribute.clone(),
                }
            })?;

            if !field.kind.accepts(value) {
                return Err(ReBaseError::InappropriateValue {
                    entity: self.entity,
                    attribute,
                    value: value.clone(),
                });
            }
            if let (FieldKind::Object(nested), Value::Object(inner)) = (field.kind, value) {
                self.validate_fields(nested, inner, Some(&attribute))?;
            }
        }
        Ok(())
    }
}

/// Field names that hold a list of strings once accepted as a `List`.
pub(crate) fn string_list(
    entity: &'static str,
    attribute: &str,
    value: &Value,
) -> Result<Vec<String>, ReBaseError> {
    let inappropriate = || ReBaseError::InappropriateValue {
        entity,
        attribute: attribute.to_string(),
        value: value.clone(),
    };
    value
        .as_array()
        .ok_or_else(inappropriate)?
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(inappropriate))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const INNER: &[Field] = &[
        Field::new("age", FieldKind::Number),
        Field::new("id", FieldKind::Id),
    ];
    const FIELDS: &[Field] = &[
        Field::new("title", FieldKind::Text),
        Field::new("items", FieldKind::List),
        Field::new("extra", FieldKind::Any),
        Field::new("patient", FieldKind::Object(INNER)),
    ];
    const SCHEMA: Schema = Schema::new("Thing", FIELDS);

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn accepts_known_fields() {
        let input = map(json!({
            "title": "t",
            "items": [1, "two"],
            "extra": null,
            "patient": { "age": 3.5, "id": "p" }
        }));
        assert!(SCHEMA.validate(&input).is_ok());
    }

    #[test]
    fn rejects_unknown_field() {
        let err = SCHEMA.validate(&map(json!({ "bogus": 1 }))).unwrap_err();
        assert!(matches!(
            err,
            ReBaseError::InvalidAttribute { entity: "Thing", ref attribute } if attribute == "bogus"
        ));
    }

    #[test]
    fn rejects_wrong_types() {
        for input in [
            json!({ "title": 2 }),
            json!({ "title": null }),
            json!({ "items": "a" }),
            json!({ "patient": "Joe" }),
        ] {
            let err = SCHEMA.validate(&map(input)).unwrap_err();
            assert!(matches!(err, ReBaseError::InappropriateValue { .. }));
        }
    }

    #[test]
    fn nested_failures_use_dotted_names() {
        let err = SCHEMA
            .validate(&map(json!({ "patient": { "age": "old" } })))
            .unwrap_err();
        assert!(matches!(
            err,
            ReBaseError::InappropriateValue { ref attribute, .. } if attribute == "patient.age"
        ));

        let err = SCHEMA
            .validate(&map(json!({ "patient": { "age": 20, "nope": 1 } })))
            .unwrap_err();
        assert!(matches!(
            err,
            ReBaseError::InvalidAttribute { ref attribute, .. } if attribute == "patient.nope"
        ));
    }

    #[test]
    fn booleans_are_not_numbers_or_ids() {
        assert!(!FieldKind::Number.accepts(&json!(true)));
        assert!(!FieldKind::Id.accepts(&json!(false)));
        assert!(FieldKind::Number.accepts(&json!(0)));
    }

    #[test]
    fn string_list_rejects_non_strings() {
        assert_eq!(
            string_list("Thing", "items", &json!(["a", "b"])).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(string_list("Thing", "items", &json!(["a", 1])).is_err());
    }
}
