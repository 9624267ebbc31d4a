//! Executes `HttpRequest` values over the network.
//!
//! `Transport` is the seam between the pure client core and real I/O.
//! `UreqTransport` is the default blocking implementation; tests and hosts
//! with their own HTTP stack implement the trait instead.

use std::time::Duration;

use tracing::debug;
use ureq::{Agent, RequestBuilder};

use crate::config::DEFAULT_TIMEOUT;
use crate::error::ReBaseError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

pub trait Transport {
    /// Perform the round-trip. Non-2xx statuses are returned as data; only
    /// failures to obtain a response are errors.
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ReBaseError>;
}

/// Blocking transport backed by a `ureq::Agent`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        // Status codes are left to `ReBaseClient::parse_response`.
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ReBaseError> {
        debug!(
            method = %request.method,
            path = %request.path,
            params = request.query.len(),
            "sending request"
        );

        let path = request.path.as_str();
        let result = match request.method {
            HttpMethod::Get => decorate(self.agent.get(path), request).call(),
            HttpMethod::Delete => decorate(self.agent.delete(path), request).call(),
            HttpMethod::Post => send(decorate(self.agent.post(path), request), request),
            HttpMethod::Put => send(decorate(self.agent.put(path), request), request),
        };
        let mut response = result.map_err(|e| ReBaseError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ReBaseError::Transport(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn decorate<B>(mut builder: RequestBuilder<B>, request: &HttpRequest) -> RequestBuilder<B> {
    for (name, value) in &request.headers {
        // content-type is set by `send` for bodies
        if name.eq_ignore_ascii_case("content-type") {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    for (key, value) in &request.query {
        builder = builder.query(key, value);
    }
    builder
}

fn send(
    builder: RequestBuilder<ureq::typestate::WithBody>,
    request: &HttpRequest,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match &request.body {
        Some(body) => builder
            .content_type("application/json")
            .send(body.as_bytes()),
        None => builder.send_empty(),
    }
}
