//! Core of the Dolphin MySQL client.
//!
//! This crate provides the synchronous data-access layer:
//!
//! - **error**: Error handling with MySQL error codes and SQLSTATE
//! - **models**: Connection configuration, results, statistics
//! - **driver**: The seam between the core and the MySQL client library
//! - **sanitizer**: Injection heuristics, identifier checks, escaping
//! - **services**: Connection wrapper, transactions, pooling, introspection
//! - **logging**: Structured logging setup

pub mod driver;
pub mod error;
pub mod logging;
pub mod models;
pub mod sanitizer;
pub mod services;


pub use driver::{Connection, Connector, MySqlConnection, MySqlConnector};
pub use error::{DolphinError, DriverError, ErrorInfo};
pub use models::{
    ColumnDetail, ConnectionConfig, ConnectionConfigBuilder, FromField, IndexDetail, PoolStatus,
    QueryResult, Row, StatisticsSnapshot, TlsConfig, NULL_SENTINEL,
};
pub use sanitizer::SqlSanitizer;
pub use services::{ConnectionPool, ConnectionWrapper, PooledConnection, TransactionGuard};
