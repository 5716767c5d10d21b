//! Error types shared by every graphmux client and transport.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP error information captured from reqwest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorInfo {
    /// Error message.
    pub message: String,
    /// HTTP status code (if available).
    pub status_code: Option<u16>,
    /// Whether the error was a timeout.
    pub is_timeout: bool,
    /// Whether the error was a connection failure.
    pub is_connect: bool,
}

impl From<reqwest::Error> for HttpErrorInfo {
    fn from(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            status_code: err.status().map(|status| status.as_u16()),
            is_timeout: err.is_timeout(),
            is_connect: err.is_connect(),
        }
    }
}

/// GraphQL error location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlErrorLocation {
    /// Line number in the query (1-based).
    pub line: u32,
    /// Column number in the query (1-based).
    pub column: u32,
}

/// GraphQL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphqlPathSegment {
    /// Field name.
    Key(String),
    /// Array index.
    Index(i64),
}

/// GraphQL error (per GraphQL spec).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Human-readable error message.
    pub message: String,
    /// Location(s) within the query.
    #[serde(default)]
    pub locations: Vec<GraphqlErrorLocation>,
    /// Path within the response where the error occurred.
    #[serde(default)]
    pub path: Vec<GraphqlPathSegment>,
    /// Extensions metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

/// Error type for client operations.
///
/// Transport-level failures are surfaced to application call sites with the
/// GraphQL error list intact; lifecycle operations (cache reset, socket
/// restart) absorb their own failures and only log them.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// HTTP/network error.
    #[error("HTTP error: {0:?}")]
    Http(HttpErrorInfo),

    /// HTTP response status error.
    #[error("HTTP status {status} with body: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated if needed).
        body: String,
    },

    /// JSON serialization or parsing error.
    #[error("JSON error: {0}")]
    Json(String),

    /// GraphQL-level errors returned by the server.
    #[error("GraphQL errors: {errors:?}")]
    GraphqlErrors {
        /// GraphQL error list.
        errors: Vec<GraphqlError>,
    },

    /// Transport or wire-protocol violation.
    #[error("protocol error: {message}")]
    Protocol {
        /// Details.
        message: String,
    },

    /// Login was attempted without a token.
    ///
    /// Clearing the stored token is only ever performed by logout.
    #[error("login requires a non-empty token")]
    EmptyToken,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(HttpErrorInfo::from(err))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl ClientError {
    /// Convert a GraphQL error list into a client error.
    #[must_use]
    pub const fn graphql(errors: Vec<GraphqlError>) -> Self {
        Self::GraphqlErrors { errors }
    }

    /// Build a protocol error from a display-able cause.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// Setup-time errors. Only the absence of any configured client is fatal;
/// a client missing both endpoints is reported and still constructed.
#[derive(Debug, Error)]
pub enum SetupError {
    /// No clients were configured.
    #[error("at least one client must be configured")]
    NoClientsConfigured,

    /// A client configuration file could not be loaded.
    #[error("unable to resolve config for client `{client}`: {message}")]
    ConfigLoad {
        /// Client name.
        client: String,
        /// Loader failure details.
        message: String,
    },

    /// A client's transport could not be constructed.
    #[error("failed to build client `{client}`: {message}")]
    ClientBuild {
        /// Client name.
        client: String,
        /// Construction failure details.
        message: String,
    },
}
