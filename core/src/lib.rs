//! Blocking client for a tree-structured JSON store served over HTTP(S).
//!
//! # Overview
//! A `Reference` names one location in the remote tree. `child` narrows it,
//! the query setters (`shallow`, `order_by`, `start_at`, `end_at`, ...) shape
//! reads, and `value`, `set`, `update`, `push` and `remove` talk to the
//! server.
//!
//! ```ignore
//! use treestore_core::Reference;
//!
//! let root = Reference::new("my-app.example.com", None)?;
//! let mut users = root.child("users");
//! let page = users.order_by("\"age\"").start_at("21").value("")?;
//! ```
//!
//! # Design
//! - Each reference owns its `QueryParams`; children start empty and never
//!   observe a parent's params.
//! - Requests travel as plain `HttpRequest`/`HttpResponse` data through the
//!   `Transport` trait. The default `TimedTransport` bounds dialing and the
//!   wait for response headers with one shared budget and reports which phase
//!   ran out.
//! - Failures are a closed `Error` enum so callers can tell a timeout from a
//!   refused connection or a rejected request.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod params;
pub mod reference;
pub mod transport;

mod executor;

pub use crate::client::Client;
pub use crate::config::{default_timeout, set_default_timeout, Config, DEFAULT_TIMEOUT};
pub use crate::error::Error;
pub use crate::http::{HttpMethod, HttpRequest, HttpResponse};
pub use crate::params::QueryParams;
pub use crate::reference::Reference;
pub use crate::transport::{Attempt, HeaderDeadline, Phase, TimedTransport, Transport};
