//! Client that performs the network round-trip itself.
//!
//! `BlockingClient` pairs a `ReBaseClient` with a `Transport`. Operations
//! that need an id or a serialized body return `Result`, failing before any
//! request is sent; everything after that is reported inside the returned
//! `ApiResponse`, including transport failures.

use tracing::warn;

use crate::client::{Credentials, ReBaseClient};
use crate::config::ClientConfig;
use crate::error::ReBaseError;
use crate::http::HttpRequest;
use crate::movement::Movement;
use crate::response::{ApiResponse, ResponseKind};
use crate::session::Session;
use crate::transport::{Transport, UreqTransport};
use crate::types::FetchQuery;

#[derive(Debug, Clone)]
pub struct BlockingClient<T: Transport = UreqTransport> {
    client: ReBaseClient,
    transport: T,
}

impl BlockingClient<UreqTransport> {
    pub fn new(base_url: &str, credentials: Credentials) -> Self {
        Self::with_transport(
            ReBaseClient::with_credentials(base_url, credentials),
            UreqTransport::default(),
        )
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ReBaseError> {
        let client = ReBaseClient::from_config(config)?;
        Ok(Self::with_transport(client, UreqTransport::new(config.timeout)))
    }
}

impl<T: Transport> BlockingClient<T> {
    pub fn with_transport(client: ReBaseClient, transport: T) -> Self {
        Self { client, transport }
    }

    pub fn client(&self) -> &ReBaseClient {
        &self.client
    }

    pub fn fetch_movements(&self, query: &FetchQuery) -> ApiResponse {
        self.send(ResponseKind::FetchMovements, self.client.build_fetch_movements(query))
    }

    pub fn find_movement(&self, movement_id: &str, legacy: bool) -> Result<ApiResponse, ReBaseError> {
        let request = self.client.build_find_movement(movement_id, legacy)?;
        Ok(self.send(ResponseKind::FindMovement, request))
    }

    pub fn insert_movement(&self, movement: &Movement) -> Result<ApiResponse, ReBaseError> {
        let request = self.client.build_insert_movement(movement)?;
        Ok(self.send(ResponseKind::InsertMovement, request))
    }

    pub fn update_movement(&self, movement: &Movement) -> Result<ApiResponse, ReBaseError> {
        let request = self.client.build_update_movement(movement)?;
        Ok(self.send(ResponseKind::UpdateMovement, request))
    }

    pub fn delete_movement(&self, movement_id: &str) -> Result<ApiResponse, ReBaseError> {
        let request = self.client.build_delete_movement(movement_id)?;
        Ok(self.send(ResponseKind::DeleteMovement, request))
    }

    pub fn fetch_sessions(&self, query: &FetchQuery) -> ApiResponse {
        self.send(ResponseKind::FetchSessions, self.client.build_fetch_sessions(query))
    }

    pub fn find_session(&self, session_id: &str, legacy: bool) -> Result<ApiResponse, ReBaseError> {
        let request = self.client.build_find_session(session_id, legacy)?;
        Ok(self.send(ResponseKind::FindSession, request))
    }

    pub fn insert_session(&self, session: &Session) -> Result<ApiResponse, ReBaseError> {
        let request = self.client.build_insert_session(session)?;
        Ok(self.send(ResponseKind::InsertSession, request))
    }

    pub fn update_session(&self, session: &Session) -> Result<ApiResponse, ReBaseError> {
        let request = self.client.build_update_session(session)?;
        Ok(self.send(ResponseKind::UpdateSession, request))
    }

    pub fn delete_session(&self, session_id: &str, deep: bool) -> Result<ApiResponse, ReBaseError> {
        let request = self.client.build_delete_session(session_id, deep)?;
        Ok(self.send(ResponseKind::DeleteSession, request))
    }

    fn send(&self, kind: ResponseKind, request: HttpRequest) -> ApiResponse {
        match self.transport.execute(&request) {
            Ok(response) => self.client.parse_response(kind, response),
            Err(e) => {
                warn!(method = %request.method, path = %request.path, error = %e, "request failed");
                ApiResponse::error(None, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, HttpResponse};
    use std::cell::RefCell;

    /// Records requests and answers each with a canned response.
    struct Canned {
        reply: Result<(u16, &'static str), &'static str>,
        seen: RefCell<Vec<HttpRequest>>,
    }

    impl Canned {
        fn ok(status: u16, body: &'static str) -> Self {
            Self {
                reply: Ok((status, body)),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn failing(message: &'static str) -> Self {
            Self {
                reply: Err(message),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for Canned {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ReBaseError> {
            self.seen.borrow_mut().push(request.clone());
            match self.reply {
                Ok((status, body)) => Ok(HttpResponse {
                    status,
                    headers: Vec::new(),
                    body: body.to_string(),
                }),
                Err(message) => Err(ReBaseError::Transport(message.to_string())),
            }
        }
    }

    fn blocking(transport: Canned) -> BlockingClient<Canned> {
        let credentials = Credentials::new("me@example.com", "secret").unwrap();
        BlockingClient::with_transport(
            ReBaseClient::with_credentials("http://rebase.test", credentials),
            transport,
        )
    }

    #[test]
    fn transport_failure_becomes_error_envelope() {
        let client = blocking(Canned::failing("connection refused"));
        let response = client.fetch_movements(&FetchQuery::default());
        assert_eq!(response.kind, ResponseKind::ApiError);
        assert_eq!(response.status, 1);
        assert_eq!(response.code, None);
        assert_eq!(response.error_message(), Some("transport failed: connection refused"));
    }

    #[test]
    fn missing_id_fails_before_sending() {
        let client = blocking(Canned::ok(200, "{}"));
        assert!(client.find_session("", false).is_err());
        assert!(client.delete_movement("").is_err());
        assert!(client.update_session(&Session::new()).is_err());
        assert!(client.transport.seen.borrow().is_empty());
    }

    #[test]
    fn delete_session_sends_deep_flag() {
        let client = blocking(Canned::ok(200, r#"{"status":0,"deletedId":"s1"}"#));
        let response = client.delete_session("s1", true).unwrap();
        assert!(response.success());
        assert_eq!(response.kind, ResponseKind::DeleteSession);
        assert_eq!(response.deleted_id(), Some(&serde_json::json!("s1")));

        let seen = client.transport.seen.borrow();
        assert_eq!(seen[0].method, HttpMethod::Delete);
        assert_eq!(seen[0].query, vec![("deep".to_string(), "true".to_string())]);
        assert_eq!(seen[0].header("rebase-user-token"), Some("secret"));
    }

    #[test]
    fn not_found_is_api_error() {
        let client = blocking(Canned::ok(404, r#"{"status":1,"message":"Session not found"}"#));
        let response = client.find_session("missing", false).unwrap();
        assert!(!response.success());
        assert_eq!(response.code, Some(404));
        assert_eq!(response.label(), "API Error");
    }
}
