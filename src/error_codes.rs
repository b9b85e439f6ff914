//! Error codes for failed introspection runs.
//!
//! Every failure of a pull is normalized into a [`PullError`]: an optional stable
//! code plus a human-readable message. The codes are the contract for automation;
//! configuration problems that the operator fixes by editing flags or files
//! (provider mismatch, missing datasource) deliberately carry no code.

use serde::Serialize;
use std::error::Error as _;
use thiserror::Error;

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    /// Credentials rejected by the server
    #[serde(rename = "P1000")]
    AuthenticationFailed,
    /// Host unreachable, DNS failure, refused connection or connect timeout
    #[serde(rename = "P1001")]
    DatabaseUnreachable,
    /// Database named in the connection string does not exist
    #[serde(rename = "P1003")]
    DatabaseNotFound,
    /// Role exists but may not access the database
    #[serde(rename = "P1010")]
    AccessDenied,
    /// Schema file could not be parsed or validated
    #[serde(rename = "P1012")]
    SchemaValidation,
    /// Connection string could not be parsed
    #[serde(rename = "P1013")]
    InvalidDatabaseString,
    /// Server closed the connection mid-session
    #[serde(rename = "P1017")]
    ConnectionClosed,
}

impl ErrorCode {
    /// Wire form of the code (e.g. `P1001`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationFailed => "P1000",
            ErrorCode::DatabaseUnreachable => "P1001",
            ErrorCode::DatabaseNotFound => "P1003",
            ErrorCode::AccessDenied => "P1010",
            ErrorCode::SchemaValidation => "P1012",
            ErrorCode::InvalidDatabaseString => "P1013",
            ErrorCode::ConnectionClosed => "P1017",
        }
    }

    /// Human-readable description of the code.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationFailed => "authentication failed",
            ErrorCode::DatabaseUnreachable => "cannot reach database server",
            ErrorCode::DatabaseNotFound => "database does not exist",
            ErrorCode::AccessDenied => "access denied",
            ErrorCode::SchemaValidation => "schema validation error",
            ErrorCode::InvalidDatabaseString => "invalid database string",
            ErrorCode::ConnectionClosed => "server closed the connection",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::AuthenticationFailed
            | ErrorCode::DatabaseUnreachable
            | ErrorCode::DatabaseNotFound
            | ErrorCode::AccessDenied
            | ErrorCode::ConnectionClosed => ErrorCategory::Connectivity,

            ErrorCode::SchemaValidation | ErrorCode::InvalidDatabaseString => {
                ErrorCategory::Configuration
            }
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// The database could not be reached or refused the session
    Connectivity,
    /// Flags, files or connection strings are wrong
    Configuration,
}

/// A classified failure: the `Failed` outcome of a pull.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PullError {
    pub code: Option<ErrorCode>,
    pub message: String,
}

impl PullError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Configuration failure reported without a stable code.
    pub fn uncoded(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn schema_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SchemaValidation, message)
    }

    pub fn invalid_database_string(details: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidDatabaseString,
            format!("The provided database string is invalid. {}", details),
        )
    }

    pub fn unreachable(target: &ConnectTarget) -> Self {
        let addr = target.address();
        Self::new(
            ErrorCode::DatabaseUnreachable,
            format!(
                "Can't reach database server at `{addr}`\n\n\
                 Please make sure your database server is running at `{addr}`."
            ),
        )
    }

    pub fn authentication_failed(target: &ConnectTarget) -> Self {
        Self::new(
            ErrorCode::AuthenticationFailed,
            format!(
                "Authentication failed against database server at `{host}`, the provided database credentials for `{user}` are not valid.\n\n\
                 Please make sure to provide valid database credentials for the database server at `{host}`.",
                host = target.host,
                user = target.user
            ),
        )
    }

    pub fn database_not_found(target: &ConnectTarget) -> Self {
        Self::new(
            ErrorCode::DatabaseNotFound,
            format!(
                "Database `{}` does not exist on the database server at `{}`.",
                target.database,
                target.address()
            ),
        )
    }

    pub fn access_denied(target: &ConnectTarget) -> Self {
        Self::new(
            ErrorCode::AccessDenied,
            format!(
                "User `{}` was denied access on the database `{}`",
                target.user, target.database
            ),
        )
    }

    pub fn connection_closed() -> Self {
        Self::new(ErrorCode::ConnectionClosed, "Server has closed the connection.")
    }

    /// Attach an extra paragraph to the message (keeps the code).
    pub fn with_note(mut self, note: impl AsRef<str>) -> Self {
        self.message.push_str("\n\n");
        self.message.push_str(note.as_ref());
        self
    }

    /// Classify a connect-phase tokio_postgres error.
    pub fn from_connect_error(err: &tokio_postgres::Error, target: &ConnectTarget) -> Self {
        if let Some(db_err) = err.as_db_error() {
            return match db_err.code().code() {
                // Class 28 - Invalid Authorization Specification
                "28P01" | "28000" => Self::authentication_failed(target),
                // invalid_catalog_name
                "3D000" => Self::database_not_found(target),
                // insufficient_privilege (CONNECT revoked)
                "42501" => Self::access_denied(target),
                // Class 57 - Operator Intervention
                "57P01" | "57P02" | "57P03" => Self::connection_closed(),
                // Class 53 - too_many_connections and friends still mean "cannot get in"
                "53300" => Self::unreachable(target)
                    .with_note(format!("The server reported: {}", db_err.message())),
                _ => Self::from_message(&err.to_string(), target),
            };
        }

        if err.is_closed() {
            return Self::connection_closed();
        }

        // I/O failures (refused, DNS, reset) arrive as the error source.
        if err
            .source()
            .and_then(|s| s.downcast_ref::<std::io::Error>())
            .is_some()
        {
            return Self::unreachable(target);
        }

        Self::from_message(&err.to_string(), target)
    }

    /// Classify a query-phase error (catalog enumeration).
    pub fn from_query_error(err: &tokio_postgres::Error, target: &ConnectTarget) -> Self {
        if err.is_closed() {
            return Self::connection_closed();
        }
        if let Some(db_err) = err.as_db_error() {
            if db_err.code().code() == "42501" {
                return Self::access_denied(target);
            }
            if db_err.code().code().starts_with("57P") {
                return Self::connection_closed();
            }
            return Self::uncoded(format!("Introspection query failed: {}", db_err.message()));
        }
        Self::uncoded(format!("Introspection query failed: {}", err))
    }

    /// Heuristic fallback on the error text.
    fn from_message(msg: &str, target: &ConnectTarget) -> Self {
        let msg = msg.to_lowercase();
        if msg.contains("password authentication failed") || msg.contains("authentication failed")
        {
            Self::authentication_failed(target)
        } else if msg.contains("does not exist") && msg.contains("database") {
            Self::database_not_found(target)
        } else if msg.contains("permission denied") {
            Self::access_denied(target)
        } else if msg.contains("connection closed") {
            Self::connection_closed()
        } else {
            // Anything else during connect means the server could not be used.
            Self::unreachable(target)
        }
    }
}

/// Display-safe description of the server a session targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
}

impl ConnectTarget {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Normalize any error coming out of the pipeline into a [`PullError`].
pub fn classify(err: &anyhow::Error) -> PullError {
    if let Some(pull_err) = err.downcast_ref::<PullError>() {
        return pull_err.clone();
    }
    PullError::uncoded(format!("{err:#}"))
}
