//! Error types for the ReBase client.
//!
//! # Design
//! Construction, invariant and required-parameter failures are programmer
//! errors and are returned as `Err`. Transport and remote failures are
//! expected at runtime and never leave the blocking client as `Err`; they are
//! folded into an `ApiResponse` of kind `ApiError` instead. `Transport` exists
//! so the `Transport` trait has something to return before that folding.

use serde_json::Value;
use thiserror::Error;

/// Errors returned by entity construction, request building and transports.
#[derive(Debug, Error)]
pub enum ReBaseError {
    /// A field name outside the entity's allow-list.
    #[error("Invalid attribute in {entity} object: '{attribute}'")]
    InvalidAttribute {
        entity: &'static str,
        attribute: String,
    },

    /// A known field carrying a value of the wrong type.
    #[error("Inappropriate value for attribute '{attribute}' in {entity} object: {value}")]
    InappropriateValue {
        entity: &'static str,
        attribute: String,
        value: Value,
    },

    /// The value cannot be used as a rotation.
    #[error("Invalid object to be used as rotation (expected Rotation or list): {0}")]
    InvalidRotation(Value),

    /// The value cannot be used to build a register.
    #[error("Invalid articulation parameter (expected dictionary or list): {0}")]
    InvalidRegister(Value),

    #[error("Duplicate articulation '{articulation}' in list {list:?}")]
    RepeatedArticulation {
        articulation: String,
        list: Vec<String>,
    },

    /// A register whose articulation list differs from its movement's.
    #[error("Articulation lists do not match: {} and {found:?}", describe_list(.expected))]
    MismatchedArticulations {
        expected: Option<Vec<String>>,
        found: Vec<String>,
    },

    /// A request that needs an attribute (usually an id) was built without it.
    #[error("Essential attribute '{0}' is missing from request")]
    MissingAttribute(&'static str),

    /// An id that cannot be placed in a single URL path segment.
    #[error("Invalid {attribute} '{id}': ids may not contain '/', '?' or '#'")]
    InvalidId {
        attribute: &'static str,
        id: String,
    },

    #[error("{0} must be provided and be a non-empty string")]
    InvalidCredential(&'static str),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("transport failed: {0}")]
    Transport(String),
}

fn describe_list(list: &Option<Vec<String>>) -> String {
    match list {
        Some(list) => format!("{list:?}"),
        None => "None".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_the_wire_conventions() {
        let missing = ReBaseError::MissingAttribute("attribute");
        let mismatched = ReBaseError::MismatchedArticulations {
            expected: Some(vec!["a1".into()]),
            found: vec!["a2".into()],
        };
        let repeated = ReBaseError::RepeatedArticulation {
            articulation: "a1".into(),
            list: vec!["a1".into(), "a1".into()],
        };

        assert_eq!(
            missing.to_string(),
            "Essential attribute 'attribute' is missing from request"
        );
        assert_eq!(
            mismatched.to_string(),
            r#"Articulation lists do not match: ["a1"] and ["a2"]"#
        );
        assert_eq!(
            repeated.to_string(),
            r#"Duplicate articulation 'a1' in list ["a1", "a1"]"#
        );
    }

    #[test]
    fn invalid_attribute_names_the_field() {
        let err = ReBaseError::InvalidAttribute {
            entity: "Movement",
            attribute: "bogus".into(),
        };
        assert_eq!(err.to_string(), "Invalid attribute in Movement object: 'bogus'");
    }

    #[test]
    fn invalid_id_names_the_attribute() {
        let err = ReBaseError::InvalidId {
            attribute: "movement id",
            id: "a/b".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid movement id 'a/b': ids may not contain '/', '?' or '#'"
        );
    }
}
