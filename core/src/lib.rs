//! Client core for the ReBase motion-capture API.
//!
//! # Overview
//! Models the ReBase entities (`Rotation`, `Register`, `Movement`, `Session`)
//! with their validation and derived-field invariants, and talks to the
//! service over HTTP. Request building and response parsing live in
//! `ReBaseClient` and never touch the network (host-does-IO pattern);
//! `BlockingClient` adds a `Transport` to run the round-trip.
//!
//! # Design
//! - Entities are built from JSON field mappings checked against a
//!   per-entity `Schema`; unknown keys and wrongly typed values are errors.
//! - A `Movement` owns its registers and keeps every register's
//!   articulation list identical to its own.
//! - Domain and argument errors are `ReBaseError`. Server and transport
//!   failures come back as `ApiResponse` values of kind `ApiError`.

pub mod blocking;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod movement;
pub mod register;
pub mod response;
pub mod rotation;
pub mod schema;
pub mod session;
pub mod transport;
pub mod types;
mod wire;

pub use blocking::BlockingClient;
pub use client::{Credentials, ReBaseClient};
pub use config::ClientConfig;
pub use error::ReBaseError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use movement::Movement;
pub use register::Register;
pub use response::{ApiResponse, Payload, ResponseKind};
pub use rotation::Rotation;
pub use session::Session;
pub use transport::{Transport, UreqTransport};
pub use types::{FetchQuery, Id};
