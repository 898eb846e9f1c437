//! Error types for the SQL check gateway.
//!
//! `GatewayError` is the single error type used across the crate. Every variant
//! maps onto a wire-level [`ErrorKind`], which is what the agent sees in the
//! `{error_kind, message}` envelope. Messages that may carry driver output are
//! passed through [`sanitize_message`] so credentials never leave the process.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the length of any message returned to the agent.
pub const MAX_ERROR_MESSAGE_LEN: usize = 512;

/// Closed taxonomy of failures reported across the tool-call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ErrorKind {
    UnknownTool,
    InvalidArguments,
    InvalidIdentifier,
    ForbiddenStatement,
    NotFound,
    Timeout,
    DatabaseError,
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownTool => "UnknownTool",
            Self::InvalidArguments => "InvalidArguments",
            Self::InvalidIdentifier => "InvalidIdentifier",
            Self::ForbiddenStatement => "ForbiddenStatement",
            Self::NotFound => "NotFound",
            Self::Timeout => "Timeout",
            Self::DatabaseError => "DatabaseError",
            Self::Unavailable => "Unavailable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("Statement not allowed: {message}")]
    ForbiddenStatement { message: String },

    /// Text the parser cannot read; reported with the `ForbiddenStatement` kind.
    #[error("Unsupported query syntax: {message}. Rephrase the SELECT using standard SQL")]
    UnsupportedSyntax { message: String },

    #[error("Object not found: {object}")]
    NotFound { object: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Database unavailable: {message}")]
    Unavailable { message: String },

    #[error("Tool '{name}' is already registered")]
    DuplicateTool { name: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn invalid_identifier(value: impl Into<String>, reason: impl Into<String>) -> Self {
        let value: String = value.into();
        // Echo back a bounded prefix only; the raw value is attacker-controlled.
        let value = value.chars().take(80).collect();
        Self::InvalidIdentifier {
            value,
            reason: reason.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::ForbiddenStatement {
            message: message.into(),
        }
    }

    pub fn unsupported_syntax(message: impl Into<String>) -> Self {
        Self::UnsupportedSyntax {
            message: message.into(),
        }
    }

    pub fn not_found(object: impl Into<String>) -> Self {
        Self::NotFound {
            object: object.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a database error. The message is sanitized.
    pub fn database(message: impl AsRef<str>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: sanitize_message(message.as_ref()),
            sql_state,
        }
    }

    /// Create an unavailable error. The message is sanitized.
    pub fn unavailable(message: impl AsRef<str>) -> Self {
        Self::Unavailable {
            message: sanitize_message(message.as_ref()),
        }
    }

    pub fn duplicate_tool(name: impl Into<String>) -> Self {
        Self::DuplicateTool { name: name.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wire-level kind for this error.
    ///
    /// Registry, configuration and internal faults never originate from an agent
    /// request; if one does surface at the boundary it is reported as a
    /// `DatabaseError` so the taxonomy stays closed.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTool { .. } => ErrorKind::UnknownTool,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
            Self::ForbiddenStatement { .. } | Self::UnsupportedSyntax { .. } => {
                ErrorKind::ForbiddenStatement
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Database { .. }
            | Self::DuplicateTool { .. }
            | Self::Config { .. }
            | Self::Internal { .. } => ErrorKind::DatabaseError,
        }
    }

    /// Message placed in the error envelope.
    pub fn envelope_message(&self) -> String {
        let msg = match self {
            Self::Database {
                message,
                sql_state: Some(code),
            } => format!("Database error: {} (SQLSTATE: {})", message, code),
            other => other.to_string(),
        };
        sanitize_message(&msg)
    }

    /// Only connection-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Convert sqlx errors to GatewayError.
impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                GatewayError::database(db_err.message(), code)
            }
            sqlx::Error::Io(io_err) => GatewayError::unavailable(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => {
                GatewayError::unavailable(format!("TLS error: {}", tls_err))
            }
            sqlx::Error::PoolTimedOut => {
                GatewayError::unavailable("timed out waiting for a pooled connection")
            }
            sqlx::Error::PoolClosed => GatewayError::unavailable("connection pool is closed"),
            sqlx::Error::WorkerCrashed => GatewayError::unavailable("database worker crashed"),
            sqlx::Error::Configuration(msg) => {
                GatewayError::unavailable(format!("invalid connection settings: {}", msg))
            }
            sqlx::Error::RowNotFound => GatewayError::database("no rows returned", None),
            sqlx::Error::ColumnDecode { index, source } => GatewayError::database(
                format!("failed to decode column {}: {}", index, source),
                None,
            ),
            other => GatewayError::database(other.to_string(), None),
        }
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Mask URL passwords and bound the length of a message.
pub fn sanitize_message(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find("://") {
        let (head, tail) = rest.split_at(pos + 3);
        out.push_str(head);

        let authority_end = tail
            .find(|c: char| c.is_whitespace() || matches!(c, '/' | '\'' | '"' | '`'))
            .unwrap_or(tail.len());
        let authority = &tail[..authority_end];

        match authority.rfind('@') {
            Some(at) => {
                let userinfo = &authority[..at];
                match userinfo.split_once(':') {
                    Some((user, _password)) => {
                        out.push_str(user);
                        out.push_str(":****");
                    }
                    None => out.push_str(userinfo),
                }
                out.push_str(&authority[at..]);
            }
            None => out.push_str(authority),
        }
        rest = &tail[authority_end..];
    }
    out.push_str(rest);

    if out.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let mut truncated: String = out.chars().take(MAX_ERROR_MESSAGE_LEN - 3).collect();
        truncated.push_str("...");
        return truncated;
    }
    out
}
