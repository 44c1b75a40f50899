//! Error types for clickhouse-sink
//!
//! Two layers: [`InsertError`] is what the batch insert executor reports,
//! [`ConnectorError`] is what the connector surface (writer, sink) reports
//! to the hosting framework.

use thiserror::Error;

/// Result type alias for connector operations
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Failure of a single batch insert.
///
/// The batch is all-or-nothing: whichever variant is returned, no row of the
/// batch is known to be committed. Nothing here is retried.
#[derive(Debug, Error)]
pub enum InsertError {
    /// A record lacks a value for a column of the batch's schema.
    #[error("record {record_index} has no value for field '{field}'")]
    MissingFieldValue { record_index: usize, field: String },

    /// The request never completed (refused, reset, DNS, TLS, ...).
    #[error("connectivity failure: {message}")]
    Connectivity { statement: String, message: String },

    /// The server received the statement and rejected or failed it.
    #[error("execution failure{}: {message}", code_suffix(.code))]
    Execution {
        statement: String,
        code: Option<u32>,
        message: String,
    },
}

fn code_suffix(code: &Option<u32>) -> String {
    code.map(|c| format!(" (code {c})")).unwrap_or_default()
}

impl InsertError {
    /// The statement text that failed, when one was built.
    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::MissingFieldValue { .. } => None,
            Self::Connectivity { statement, .. } | Self::Execution { statement, .. } => {
                Some(statement)
            }
        }
    }
}

/// Errors that can occur in connector operations
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Configuration validation failed
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection to ClickHouse failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Authentication failed
    #[error("authentication error: {0}")]
    Auth(String),

    /// Database or table not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Timeout waiting for response
    #[error("timeout: {0}")]
    Timeout(String),

    /// Record/column mismatch or a server-side schema complaint
    #[error("schema error: {0}")]
    Schema(String),

    /// Connector used outside of its lifecycle
    #[error("state error: {0}")]
    State(String),

    /// Fatal error that will not succeed on retry
    #[error("fatal error: {0}")]
    Fatal(String),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConnectorError {
    /// Whether the caller may reasonably try the same operation again.
    ///
    /// Purely a classification: nothing in this crate retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Classify a server-side exception message into a typed error.
    pub fn classify_server_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let lower = msg.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout(msg)
        } else if lower.contains("authentication")
            || lower.contains("access denied")
            || lower.contains("wrong password")
        {
            Self::Auth(msg)
        } else if lower.contains("unknown table")
            || lower.contains("unknown database")
            || lower.contains("doesn't exist")
        {
            Self::NotFound(msg)
        } else if lower.contains("no such column")
            || lower.contains("type mismatch")
            || lower.contains("expected column")
            || lower.contains("expected '")
        {
            Self::Schema(msg)
        } else if lower.contains("connection") || lower.contains("network") {
            Self::Connection(msg)
        } else {
            Self::Fatal(msg)
        }
    }
}

impl From<InsertError> for ConnectorError {
    fn from(err: InsertError) -> Self {
        match err {
            InsertError::MissingFieldValue { .. } => Self::Schema(err.to_string()),
            InsertError::Connectivity { message, .. } => Self::Connection(message),
            InsertError::Execution { message, .. } => Self::classify_server_message(message),
        }
    }
}
