//! Stateless HTTP request builder and response parser for the ReBase API.
//!
//! # Design
//! `ReBaseClient` holds the base URL and, optionally, the user credentials
//! sent on every request. Each operation is split into a `build_*` method
//! that produces an `HttpRequest` and a shared `parse_response` that turns an
//! `HttpResponse` into an `ApiResponse`. Executing the round-trip is left to
//! a `Transport` (see `BlockingClient`), keeping this type free of I/O.
//!
//! Builders fail only for missing ids and serialization problems. Parsing
//! never fails: non-2xx codes, unreadable bodies and payloads that do not
//! validate all come back as `ApiError` envelopes.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ReBaseError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::movement::Movement;
use crate::response::{ApiResponse, ResponseKind};
use crate::session::Session;
use crate::types::{push_flag, FetchQuery, Id};

pub const USER_EMAIL_HEADER: &str = "rebase-user-email";
pub const USER_TOKEN_HEADER: &str = "rebase-user-token";

/// User email and token sent as authentication headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    user_email: String,
    user_token: String,
}

impl Credentials {
    /// Both values are required and must be non-empty.
    pub fn new(user_email: impl Into<String>, user_token: impl Into<String>) -> Result<Self, ReBaseError> {
        let user_email = user_email.into();
        let user_token = user_token.into();
        if user_email.is_empty() {
            return Err(ReBaseError::InvalidCredential("user_email"));
        }
        if user_token.is_empty() {
            return Err(ReBaseError::InvalidCredential("user_token"));
        }
        Ok(Self {
            user_email,
            user_token,
        })
    }

    pub fn user_email(&self) -> &str {
        &self.user_email
    }

    pub fn user_token(&self) -> &str {
        &self.user_token
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        vec![
            (USER_EMAIL_HEADER.to_string(), self.user_email.clone()),
            (USER_TOKEN_HEADER.to_string(), self.user_token.clone()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    Movement,
    Session,
}

impl Resource {
    fn segment(&self) -> &'static str {
        match self {
            Resource::Movement => "movement",
            Resource::Session => "session",
        }
    }
}

/// Synchronous, stateless client for the ReBase API.
#[derive(Debug, Clone)]
pub struct ReBaseClient {
    base_url: String,
    credentials: Option<Credentials>,
}

impl ReBaseClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
        }
    }

    pub fn with_credentials(base_url: &str, credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..Self::new(base_url)
        }
    }

    /// Credentials are attached when either one is configured, in which case
    /// both must be present and non-empty.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ReBaseError> {
        match (&config.user_email, &config.user_token) {
            (None, None) => Ok(Self::new(&config.base_url)),
            (email, token) => {
                let email = email.clone().ok_or(ReBaseError::InvalidCredential("user_email"))?;
                let token = token.clone().ok_or(ReBaseError::InvalidCredential("user_token"))?;
                Ok(Self::with_credentials(&config.base_url, Credentials::new(email, token)?))
            }
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn authentication_headers(&self) -> Vec<(String, String)> {
        self.credentials
            .as_ref()
            .map(Credentials::headers)
            .unwrap_or_default()
    }

    pub fn build_fetch_movements(&self, query: &FetchQuery) -> HttpRequest {
        self.request(HttpMethod::Get, Resource::Movement, None, query.to_params(), None)
    }

    pub fn build_find_movement(&self, movement_id: &str, legacy: bool) -> Result<HttpRequest, ReBaseError> {
        let id = require_id(movement_id, "movement id")?;
        Ok(self.request(HttpMethod::Get, Resource::Movement, Some(id), legacy_params(legacy), None))
    }

    pub fn build_insert_movement(&self, movement: &Movement) -> Result<HttpRequest, ReBaseError> {
        let body = movement.to_json(false)?;
        Ok(self.request(HttpMethod::Post, Resource::Movement, None, Vec::new(), Some(body)))
    }

    pub fn build_update_movement(&self, movement: &Movement) -> Result<HttpRequest, ReBaseError> {
        let id = entity_id(movement.id.as_ref(), "movement id")?;
        let body = movement.to_json(true)?;
        Ok(self.request(HttpMethod::Put, Resource::Movement, Some(&id), Vec::new(), Some(body)))
    }

    pub fn build_delete_movement(&self, movement_id: &str) -> Result<HttpRequest, ReBaseError> {
        let id = require_id(movement_id, "movement id")?;
        Ok(self.request(HttpMethod::Delete, Resource::Movement, Some(id), Vec::new(), None))
    }

    pub fn build_fetch_sessions(&self, query: &FetchQuery) -> HttpRequest {
        self.request(HttpMethod::Get, Resource::Session, None, query.to_params(), None)
    }

    pub fn build_find_session(&self, session_id: &str, legacy: bool) -> Result<HttpRequest, ReBaseError> {
        let id = require_id(session_id, "session id")?;
        Ok(self.request(HttpMethod::Get, Resource::Session, Some(id), legacy_params(legacy), None))
    }

    pub fn build_insert_session(&self, session: &Session) -> Result<HttpRequest, ReBaseError> {
        let body = session.to_json(false)?;
        Ok(self.request(HttpMethod::Post, Resource::Session, None, Vec::new(), Some(body)))
    }

    pub fn build_update_session(&self, session: &Session) -> Result<HttpRequest, ReBaseError> {
        let id = entity_id(session.id.as_ref(), "session id")?;
        let body = session.to_json(true)?;
        Ok(self.request(HttpMethod::Put, Resource::Session, Some(&id), Vec::new(), Some(body)))
    }

    /// `deep` also deletes every movement of the session.
    pub fn build_delete_session(&self, session_id: &str, deep: bool) -> Result<HttpRequest, ReBaseError> {
        let id = require_id(session_id, "session id")?;
        let mut params = Vec::new();
        push_flag(&mut params, "deep", deep);
        Ok(self.request(HttpMethod::Delete, Resource::Session, Some(id), params, None))
    }

    /// Turn a raw response into an envelope tagged with `kind`, or with
    /// `ApiError` when the HTTP status is outside 2xx.
    pub fn parse_response(&self, kind: ResponseKind, response: HttpResponse) -> ApiResponse {
        let code = Some(response.status);
        let mut data = match decode_body(&response.body) {
            Ok(data) => data,
            Err(message) => {
                warn!(status = response.status, %message, "unreadable response body");
                return ApiResponse::error(code, message);
            }
        };

        data.shift_remove("status");
        let meta = match data.shift_remove("meta") {
            Some(Value::Object(meta)) => meta,
            _ => Map::new(),
        };
        let (kind, status) = if response.is_success() {
            (kind, 0)
        } else {
            (ResponseKind::ApiError, 1)
        };

        debug!(%kind, status = response.status, "parsed response");
        ApiResponse::new(kind, status, code, data, meta).unwrap_or_else(|e| {
            warn!(error = %e, "response payload failed validation");
            ApiResponse::error(code, e.to_string())
        })
    }

    fn request(
        &self,
        method: HttpMethod,
        resource: Resource,
        id: Option<&str>,
        query: Vec<(String, String)>,
        body: Option<String>,
    ) -> HttpRequest {
        let mut path = format!("{}/{}", self.base_url, resource.segment());
        if let Some(id) = id {
            path.push('/');
            path.push_str(id);
        }

        let mut headers = Vec::new();
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        headers.extend(self.authentication_headers());

        HttpRequest {
            method,
            path,
            query,
            headers,
            body,
        }
    }
}

/// Ids become a single path segment and are not encoded, so anything that
/// would end the segment is rejected.
fn require_id<'a>(id: &'a str, attribute: &'static str) -> Result<&'a str, ReBaseError> {
    if id.is_empty() {
        return Err(ReBaseError::MissingAttribute(attribute));
    }
    if id.contains(['/', '?', '#']) {
        return Err(ReBaseError::InvalidId {
            attribute,
            id: id.to_string(),
        });
    }
    Ok(id)
}

fn entity_id(id: Option<&Id>, attribute: &'static str) -> Result<String, ReBaseError> {
    match id {
        Some(id) if !id.is_empty() => require_id(&id.to_string(), attribute).map(str::to_string),
        _ => Err(ReBaseError::MissingAttribute(attribute)),
    }
}

fn legacy_params(legacy: bool) -> Vec<(String, String)> {
    let mut params = Vec::new();
    push_flag(&mut params, "legacy", legacy);
    params
}

/// An empty body reads as an empty object; anything else must be a JSON
/// object.
fn decode_body(body: &str) -> Result<Map<String, Value>, String> {
    if body.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("unexpected response body: {other}")),
        Err(e) => Err(format!("invalid response body: {e}: {body}")),
    }
}
