//! Typed envelope around a decoded server reply.
//!
//! # Design
//! `status` is the ReBase status (0 success, 1 failure) and is distinct from
//! the HTTP code, which is `None` when no response was received at all.
//! Payloads under `movement`, `movements`, `session` and `sessions` are
//! promoted to entities at construction; everything else stays raw JSON.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::ReBaseError;
use crate::movement::Movement;
use crate::session::Session;

/// Data key used for transport failures and unreadable bodies.
pub const HTML_ERROR_KEY: &str = "HTMLError";

/// The operation a response answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    FetchMovements,
    FindMovement,
    InsertMovement,
    UpdateMovement,
    DeleteMovement,
    FetchSessions,
    FindSession,
    InsertSession,
    UpdateSession,
    DeleteSession,
    ApiError,
}

impl ResponseKind {
    pub fn label(&self) -> &'static str {
        match self {
            ResponseKind::FetchMovements => "Fetch Movements",
            ResponseKind::FindMovement => "Find Movement",
            ResponseKind::InsertMovement => "Insert Movement",
            ResponseKind::UpdateMovement => "Update Movement",
            ResponseKind::DeleteMovement => "Delete Movement",
            ResponseKind::FetchSessions => "Fetch Sessions",
            ResponseKind::FindSession => "Find Session",
            ResponseKind::InsertSession => "Insert Session",
            ResponseKind::UpdateSession => "Update Session",
            ResponseKind::DeleteSession => "Delete Session",
            ResponseKind::ApiError => "API Error",
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One named result in a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Movement(Movement),
    Movements(Vec<Movement>),
    Session(Session),
    Sessions(Vec<Session>),
    Raw(Value),
}

impl Payload {
    fn promote(key: &str, value: Value) -> Result<Self, ReBaseError> {
        let payload = match key {
            "movement" => Payload::Movement(Movement::try_from(&value)?),
            "session" => Payload::Session(Session::try_from(&value)?),
            "movements" => Payload::Movements(promote_list(key, &value)?),
            "sessions" => Payload::Sessions(promote_list(key, &value)?),
            _ => Payload::Raw(value),
        };
        Ok(payload)
    }

    pub fn as_movement(&self) -> Option<&Movement> {
        match self {
            Payload::Movement(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_movements(&self) -> Option<&[Movement]> {
        match self {
            Payload::Movements(m) => Some(m.as_slice()),
            _ => None,
        }
    }

    pub fn as_session(&self) -> Option<&Session> {
        match self {
            Payload::Session(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sessions(&self) -> Option<&[Session]> {
        match self {
            Payload::Sessions(s) => Some(s.as_slice()),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Value> {
        match self {
            Payload::Raw(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Movement(m) => write!(f, "{m}"),
            Payload::Session(s) => write!(f, "{s}"),
            Payload::Movements(list) => write_list(f, list),
            Payload::Sessions(list) => write_list(f, list),
            Payload::Raw(v) => write!(f, "{v}"),
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str("]")
}

fn promote_list<T>(key: &str, value: &Value) -> Result<Vec<T>, ReBaseError>
where
    T: for<'a> TryFrom<&'a Value, Error = ReBaseError>,
{
    let items = value.as_array().ok_or_else(|| ReBaseError::InappropriateValue {
        entity: "APIResponse",
        attribute: key.to_string(),
        value: value.clone(),
    })?;
    items.iter().map(T::try_from).collect()
}

/// A server reply, or the local stand-in for one that never arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub kind: ResponseKind,
    pub status: u8,
    pub code: Option<u16>,
    /// In the order the server sent it.
    data: Vec<(String, Payload)>,
    meta: Map<String, Value>,
}

impl ApiResponse {
    /// Wrap decoded data, promoting entity payloads.
    ///
    /// Fails when an entity payload does not validate.
    pub fn new(
        kind: ResponseKind,
        status: u8,
        code: Option<u16>,
        data: Map<String, Value>,
        meta: Map<String, Value>,
    ) -> Result<Self, ReBaseError> {
        let data = data
            .into_iter()
            .map(|(key, value)| Payload::promote(&key, value).map(|payload| (key, payload)))
            .collect::<Result<Vec<_>, ReBaseError>>()?;
        Ok(Self {
            kind,
            status,
            code,
            data,
            meta,
        })
    }

    /// An `ApiError` response carrying `message` under `HTMLError`.
    pub fn error(code: Option<u16>, message: impl Into<String>) -> Self {
        let data = vec![(
            HTML_ERROR_KEY.to_string(),
            Payload::Raw(Value::String(message.into())),
        )];
        Self {
            kind: ResponseKind::ApiError,
            status: 1,
            code,
            data,
            meta: Map::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn get_data(&self, key: &str) -> Option<&Payload> {
        self.data
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, payload)| payload)
    }

    pub fn has_data(&self, key: &str) -> bool {
        self.data.iter().any(|(name, _)| name == key)
    }

    pub fn get_meta_data(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    pub fn has_meta_data(&self, key: &str) -> bool {
        self.meta.contains_key(key)
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }

    pub fn movement(&self) -> Option<&Movement> {
        self.get_data("movement").and_then(Payload::as_movement)
    }

    pub fn movements(&self) -> Option<&[Movement]> {
        self.get_data("movements").and_then(Payload::as_movements)
    }

    pub fn session(&self) -> Option<&Session> {
        self.get_data("session").and_then(Payload::as_session)
    }

    pub fn sessions(&self) -> Option<&[Session]> {
        self.get_data("sessions").and_then(Payload::as_sessions)
    }

    pub fn deleted_id(&self) -> Option<&Value> {
        self.get_data("deletedId").and_then(Payload::as_raw)
    }

    /// Error text from `HTMLError` or a server `message`, if any.
    pub fn error_message(&self) -> Option<&str> {
        [HTML_ERROR_KEY, "message", "error"]
            .iter()
            .find_map(|key| self.get_data(key).and_then(Payload::as_raw))
            .and_then(Value::as_str)
    }
}

impl fmt::Display for ApiResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "APIResponse: {{ type: {}, status: {}, code: ", self.kind, self.status)?;
        match self.code {
            Some(code) => write!(f, "{code}")?,
            None => f.write_str("-")?,
        }
        f.write_str(",\n\tdata: { ")?;
        for (i, (key, payload)) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {payload}")?;
        }
        write!(f, " }},\n\tmeta: {}\n}}", Value::Object(self.meta.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn promotes_entity_payloads() {
        let response = ApiResponse::new(
            ResponseKind::FetchMovements,
            0,
            Some(200),
            object(json!({
                "movements": [{ "id": "a", "label": "one" }, { "id": "b" }],
                "movement": { "id": "c" },
                "session": { "id": "s", "title": "t" },
                "sessions": [],
                "deletedId": "x"
            })),
            object(json!({ "total": 2 })),
        )
        .unwrap();

        assert!(response.success());
        assert_eq!(response.movements().unwrap().len(), 2);
        assert_eq!(response.movements().unwrap()[0].label.as_deref(), Some("one"));
        assert!(response.movement().is_some());
        assert_eq!(response.session().unwrap().title.as_deref(), Some("t"));
        assert_eq!(response.sessions().unwrap().len(), 0);
        assert_eq!(response.deleted_id(), Some(&json!("x")));
        assert_eq!(response.get_meta_data("total"), Some(&json!(2)));
        assert!(response.has_meta_data("total"));
        assert!(!response.has_meta_data("page"));
    }

    #[test]
    fn invalid_entity_payload_fails() {
        let result = ApiResponse::new(
            ResponseKind::FindMovement,
            0,
            Some(200),
            object(json!({ "movement": { "bogus": 1 } })),
            Map::new(),
        );
        assert!(matches!(result, Err(ReBaseError::InvalidAttribute { .. })));

        let result = ApiResponse::new(
            ResponseKind::FetchSessions,
            0,
            Some(200),
            object(json!({ "sessions": "nope" })),
            Map::new(),
        );
        assert!(matches!(result, Err(ReBaseError::InappropriateValue { .. })));
    }

    #[test]
    fn lookups_report_presence() {
        let response = ApiResponse::new(
            ResponseKind::DeleteMovement,
            0,
            Some(200),
            object(json!({ "deletedId": "m1" })),
            Map::new(),
        )
        .unwrap();
        assert!(response.has_data("deletedId"));
        assert!(!response.has_data("movement"));
        assert!(response.get_data("movement").is_none());
        assert!(response.get_meta_data("page").is_none());
    }

    #[test]
    fn error_responses() {
        let response = ApiResponse::error(None, "connection refused");
        assert!(!response.success());
        assert_eq!(response.kind, ResponseKind::ApiError);
        assert_eq!(response.label(), "API Error");
        assert_eq!(response.error_message(), Some("connection refused"));
    }

    #[test]
    fn labels() {
        assert_eq!(ResponseKind::FetchMovements.label(), "Fetch Movements");
        assert_eq!(ResponseKind::DeleteSession.to_string(), "Delete Session");
    }

    #[test]
    fn display_lists_data_and_meta() {
        let response = ApiResponse::new(
            ResponseKind::FindSession,
            0,
            Some(200),
            object(json!({ "session": { "title": "t" } })),
            object(json!({ "page": 1 })),
        )
        .unwrap();
        assert_eq!(
            response.to_string(),
            "APIResponse: { type: Find Session, status: 0, code: 200,\n\tdata: { session: {\"title\":\"t\"} },\n\tmeta: {\"page\":1}\n}"
        );
    }

    #[test]
    fn data_keeps_server_order() {
        let response = ApiResponse::new(
            ResponseKind::DeleteSession,
            0,
            Some(200),
            object(json!({ "message": "gone", "deletedId": "s1", "deep": true })),
            Map::new(),
        )
        .unwrap();
        assert_eq!(
            response.to_string(),
            "APIResponse: { type: Delete Session, status: 0, code: 200,\n\tdata: { message: \"gone\", deletedId: \"s1\", deep: true },\n\tmeta: {}\n}"
        );
        assert_eq!(response.error_message(), Some("gone"));
    }
}
