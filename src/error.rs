//! Sightline error types.
//!
//! Errors are split along the line the reconciliation protocol cares about:
//!
//! - **Transport issue**: the request never left (dispatch failed).
//! - **Transport failure**: the request left but the reply was lost, timed
//!   out or came back with a non-success HTTP status.
//! - **Malformed envelope**: a reply arrived but its body cannot be read as
//!   the generic `{code, description?}` envelope.
//! - **Protocol**: the envelope was read and carries `code != 0`.
//!
//! Lifecycle calls surface these as `Err`; batch submission folds them
//! into a [`BatchReport`](crate::protocol::BatchReport) instead.

use thiserror::Error;

/// Sightline errors.
#[derive(Error, Debug)]
pub enum SightlineError {
    /// Request could not be dispatched by the transport.
    #[error("Transport issue: {0}")]
    TransportIssue(String),

    /// Request was dispatched but no successful reply came back.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Reply body is not a valid generic envelope or lacks a required field.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Server answered with a non-zero code.
    #[error("Protocol error (code {code}): {}", description.as_deref().unwrap_or("no description"))]
    Protocol {
        /// Code reported by the server.
        code: i64,
        /// Optional human-readable description sent alongside the code.
        description: Option<String>,
    },

    /// Lifecycle operation invoked in the wrong session state.
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Network communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Sightline operations
pub type Result<T> = std::result::Result<T, SightlineError>;

impl SightlineError {
    /// Whether the server itself asked for the call to fail.
    ///
    /// True for protocol codes and unreadable envelopes, false for anything
    /// that happened below the envelope (dispatch, network, timeouts).
    pub fn is_server_signal(&self) -> bool {
        matches!(
            self,
            SightlineError::Protocol { .. } | SightlineError::MalformedEnvelope(_)
        )
    }
}

impl From<reqwest::Error> for SightlineError {
    fn from(err: reqwest::Error) -> Self {
        SightlineError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for SightlineError {
    fn from(err: toml::de::Error) -> Self {
        SightlineError::Config(err.to_string())
    }
}
