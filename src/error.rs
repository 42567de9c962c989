//! Error taxonomy for the client, the query engine and the traversal iterator.

use std::path::PathBuf;

use crate::types::Status;

/// All errors raised by `uast-client`.
///
/// Backend-side parse failures are not errors: they travel as data inside
/// [`crate::types::ParseResponse`].
#[derive(Debug, thiserror::Error)]
pub enum UastError {
    /// Malformed endpoint specification or configuration file.
    #[error("malformed configuration: {0}")]
    Config(String),

    /// No backend address is configured for the requested language.
    #[error("language {language:?} is not supported in current configuration")]
    MissingBackend { language: String },

    /// Dial, transport or framing failure on a backend connection.
    #[error("connection to {address} failed: {message}")]
    Connection { address: String, message: String },

    /// The call did not complete within its deadline.
    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    /// The connection (or client) was closed before the call completed.
    #[error("connection to {address} is closed")]
    Closed { address: String },

    /// The backend does not implement the requested RPC method.
    #[error("method {method} is not implemented by the backend")]
    Unimplemented { method: String },

    /// Any other error object returned by the backend.
    #[error("backend error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// A legacy metadata call answered with a non-OK status.
    #[error("backend returned status {status}: {}", errors.join("; "))]
    Status { status: Status, errors: Vec<String> },

    /// The operation has no meaning for this client shape.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// The query expression was rejected by the evaluator.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Internal evaluator failure, tagged with the failing operation.
    #[error("{operation}() failed: {message}")]
    Evaluator {
        operation: &'static str,
        message: String,
    },

    /// A traversal iterator was used after it finished or was disposed.
    #[error("iterator misuse: {0}")]
    IteratorMisuse(&'static str),

    /// Reading a source file for a parse request failed.
    #[error("couldn't read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl UastError {
    /// Build a [`UastError::Connection`] from any displayable cause.
    pub fn connection(address: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Connection {
            address: address.into(),
            message: cause.to_string(),
        }
    }

    /// Whether the error means "the backend does not speak this method".
    pub fn is_unimplemented(&self) -> bool {
        matches!(self, Self::Unimplemented { .. })
    }
}

pub type Result<T> = std::result::Result<T, UastError>;
