//! Error types for the Dolphin data-access core.
//!
//! Every driver failure is caught where the driver is called and turned into a
//! [`DolphinError`] carrying the native MySQL error code and SQLSTATE when the
//! server supplied them. Public operations report these inline (on a
//! [`QueryResult`](crate::models::QueryResult) or a `Result`) rather than
//! panicking across the API boundary.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Failure reported by the underlying database client.
///
/// This is the driver-neutral shape every [`Connection`](crate::driver::Connection)
/// implementation converts its native errors into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    /// Driver or server message.
    pub message: String,
    /// Native MySQL error code (e.g. 1146).
    pub code: Option<u16>,
    /// SQLSTATE (e.g. "42S02").
    pub state: Option<String>,
}

impl DriverError {
    /// Create a driver error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: None, state: None }
    }

    /// Create a driver error with server details.
    pub fn with_details(message: impl Into<String>, code: u16, state: impl Into<String>) -> Self {
        Self { message: message.into(), code: Some(code), state: Some(state.into()) }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        match (self.code, self.state.as_deref()) {
            (Some(code), Some(state)) => write!(f, " (code: {code}, state: {state})"),
            (Some(code), None) => write!(f, " (code: {code})"),
            (None, Some(state)) => write!(f, " (state: {state})"),
            (None, None) => Ok(()),
        }
    }
}

impl std::error::Error for DriverError {}

/// Main error type for the data-access core.
#[derive(Debug, Clone, Error)]
pub enum DolphinError {
    /// Connecting or reconnecting failed.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Native MySQL error code.
        code: Option<u16>,
        /// SQLSTATE reported by the server.
        state: Option<String>,
    },

    /// A statement failed on the server.
    #[error("{message}")]
    Query {
        /// Formatted message including the operation kind.
        message: String,
        /// Native MySQL error code.
        code: Option<u16>,
        /// SQLSTATE reported by the server.
        state: Option<String>,
    },

    /// Input rejected before reaching the server.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Begin, commit or rollback failed.
    #[error("Transaction error: {message}")]
    Transaction {
        /// Human-readable error message.
        message: String,
    },

    /// The pool is at capacity with no healthy idle connection.
    #[error("Pool exhausted: all {max_size} connections are in use")]
    PoolExhausted {
        /// Configured pool capacity.
        max_size: usize,
    },

    /// An operation needed a live connection and there was none.
    #[error("Not connected to a database")]
    NotConnected,

    /// Configuration could not be loaded or failed validation.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },
}

impl DolphinError {
    // ========== Constructors ==========

    /// Create a new connection error without server details.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), code: None, state: None }
    }

    /// Create a connection error from a driver failure.
    pub fn connection_from(err: DriverError) -> Self {
        Self::Connection { message: err.to_string(), code: err.code, state: err.state }
    }

    /// Create a new query error without server details.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query { message: message.into(), code: None, state: None }
    }

    /// Create a query error from a driver failure.
    ///
    /// `operation` names the kind of statement ("Query", "Execute", ...) and
    /// leads the message.
    pub fn query_from(operation: &str, err: DriverError) -> Self {
        Self::Query {
            message: format!("{operation} error: {err}"),
            code: err.code,
            state: err.state,
        }
    }

    /// Create a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create a new transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction { message: message.into() }
    }

    /// Create a pool exhaustion error.
    pub fn pool_exhausted(max_size: usize) -> Self {
        Self::PoolExhausted { max_size }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    // ========== Methods ==========

    /// Check if this error means the link to the server is gone.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::NotConnected)
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "Connection",
            Self::Query { .. } => "Query",
            Self::Validation { .. } => "Validation",
            Self::Transaction { .. } => "Transaction",
            Self::PoolExhausted { .. } => "Pool",
            Self::NotConnected => "Connection",
            Self::Config { .. } => "Config",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Connection { code: Some(1045), .. } => Some("Check username and password"),
            Self::Connection { code: Some(1049), .. } => Some("Check that the database exists"),
            Self::Connection { .. } => Some("Check that the database server is running"),
            Self::Query { .. } => None,
            Self::Validation { .. } => Some("Use bound parameters instead of building SQL text"),
            Self::Transaction { .. } => None,
            Self::PoolExhausted { .. } => Some("Release connections you no longer use"),
            Self::NotConnected => Some("Connect before running statements"),
            Self::Config { .. } => None,
        }
    }

    /// Get the native MySQL error code (if applicable).
    pub fn mysql_code(&self) -> Option<u16> {
        match self {
            Self::Connection { code, .. } | Self::Query { code, .. } => *code,
            _ => None,
        }
    }

    /// Get the SQLSTATE (if applicable).
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Connection { state, .. } | Self::Query { state, .. } => state.as_deref(),
            _ => None,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let mut parts = Vec::new();
        if let Some(code) = self.mysql_code() {
            parts.push(format!("Code: {code}"));
        }
        if let Some(state) = self.sql_state() {
            parts.push(format!("State: {state}"));
        }
        let technical_detail = if parts.is_empty() { None } else { Some(parts.join("\n")) };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    /// Category name (e.g., "Connection Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for a "Show Details" expansion.
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

/// Convert from mysql::Error to DriverError.
impl From<mysql::Error> for DriverError {
    fn from(err: mysql::Error) -> Self {
        match err {
            mysql::Error::MySqlError(server) => {
                DriverError::with_details(server.message, server.code, server.state)
            }
            other => DriverError::new(other.to_string()),
        }
    }
}

/// Convert from serde_json::Error to DolphinError.
impl From<serde_json::Error> for DolphinError {
    fn from(err: serde_json::Error) -> Self {
        DolphinError::config(format!("JSON error: {err}"))
    }
}

/// Convert from std::io::Error to DolphinError.
impl From<std::io::Error> for DolphinError {
    fn from(err: std::io::Error) -> Self {
        DolphinError::config(err.to_string())
    }
}
