//! Transport layer abstraction.
//!
//! The session client never talks to the network directly. It hands a URL
//! and a flat field map to a [`Transport`] and gets back a [`Response`]
//! handle, either already resolved (blocking mode) or resolved later by the
//! transport (non-blocking mode).
//!
//! # Backends
//!
//! - [`HttpTransport`]: form-encoded HTTP POST over `reqwest`, driven by an
//!   owned `tokio` runtime.
//! - [`ScriptedTransport`]: in-memory double whose replies are scripted by
//!   the caller; used by tests and dry runs.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sightline::transport::{HttpTransport, Mode, Request, Transport};
//!
//! let mut transport = HttpTransport::new(&TransportConfig::default())?;
//! let mut params = Request::new();
//! params.set("source_name", "lobby");
//! let response = transport.request("http://localhost:8000/start_session/", &params, Mode::Blocking)?;
//! assert!(response.is_ready());
//! ```

mod http;
mod response;
mod scripted;

use std::collections::BTreeMap;

use serde::Serialize;

pub use http::HttpTransport;
pub use response::{Outcome, Response, Responder};
pub use scripted::{Reply, ScriptedTransport, SentRequest};

use crate::error::Result;

/// How a request waits for its reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Return only once the reply is in (or the exchange failed).
    #[default]
    Blocking,
    /// Return immediately; the response resolves later.
    NonBlocking,
}

/// Outbound request: a flat map from field name to string value.
///
/// Setting a field that is already present overwrites it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Request {
    fields: BTreeMap<String, String>,
}

impl Request {
    /// Empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, returning the value it replaced.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.fields.insert(key.into(), value.into())
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Whether the field is present.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Transport trait for pluggable request backends.
///
/// `request` reports whether the call was *issued*; whether it *succeeded*
/// is carried by the returned [`Response`].
pub trait Transport {
    /// Issue a request.
    ///
    /// In [`Mode::Blocking`] the returned response is always ready.
    fn request(&mut self, url: &str, params: &Request, mode: Mode) -> Result<Response>;

    /// Pump in-flight transfers.
    ///
    /// With a handle and `blocking`, waits until that handle is ready.
    /// Without a handle and `blocking`, waits for every in-flight transfer.
    /// Non-blocking calls do one bounded bookkeeping tick.
    fn receive(&mut self, response: Option<&Response>, blocking: bool);

    /// Text of the most recent transport-level error (empty if none).
    fn error_description(&self) -> String;

    /// Transport name for logging.
    fn name(&self) -> &'static str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn request(&mut self, url: &str, params: &Request, mode: Mode) -> Result<Response> {
        (**self).request(url, params, mode)
    }

    fn receive(&mut self, response: Option<&Response>, blocking: bool) {
        (**self).receive(response, blocking);
    }

    fn error_description(&self) -> String {
        (**self).error_description()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
