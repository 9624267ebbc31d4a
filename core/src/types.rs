//! Small value types shared by the entities and the client.
//!
//! # Design
//! The server hands out string ids, but older records and tests use numeric
//! ones, so `Id` keeps whichever form it was given and renders it back
//! untouched. `FetchQuery` collects the list filters; empty values are
//! dropped when the query string is assembled.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Identifier of a movement, session, professional, patient or app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Text(String),
    Number(Number),
}

impl Id {
    /// Accepts a non-empty string or a non-zero number.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Id::Text(s.clone())),
            Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(Id::Number(n.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Id::Text(s) => Value::String(s.clone()),
            Id::Number(n) => Value::Number(n.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Id::Text(s) if s.is_empty())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Text(s) => f.write_str(s),
            Id::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Text(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::Text(s)
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n.into())
    }
}

/// Filters and pagination for `fetch_movements` / `fetch_sessions`.
///
/// For sessions, `movement_label` and `articulations` filter the embedded
/// movements. `legacy` asks the server for the old record layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchQuery {
    pub professional_id: Option<String>,
    pub patient_id: Option<String>,
    pub movement_label: Option<String>,
    pub articulations: Vec<String>,
    pub legacy: bool,
    pub page: u32,
    pub per: u32,
    pub previous_id: Option<String>,
}

impl FetchQuery {
    /// Query pairs in wire order, skipping every empty, false or zero filter.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        push_text(&mut params, "professionalId", self.professional_id.as_deref());
        push_text(&mut params, "patientId", self.patient_id.as_deref());
        push_text(&mut params, "movementLabel", self.movement_label.as_deref());
        for articulation in &self.articulations {
            params.push(("articulations".to_string(), articulation.clone()));
        }
        push_number(&mut params, "page", self.page);
        push_number(&mut params, "per", self.per);
        push_text(&mut params, "previousId", self.previous_id.as_deref());
        push_flag(&mut params, "legacy", self.legacy);
        params
    }
}

pub(crate) fn push_text(params: &mut Vec<(String, String)>, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        params.push((key.to_string(), value.to_string()));
    }
}

pub(crate) fn push_number(params: &mut Vec<(String, String)>, key: &str, value: u32) {
    if value != 0 {
        params.push((key.to_string(), value.to_string()));
    }
}

pub(crate) fn push_flag(params: &mut Vec<(String, String)>, key: &str, value: bool) {
    if value {
        params.push((key.to_string(), "true".to_string()));
    }
}
