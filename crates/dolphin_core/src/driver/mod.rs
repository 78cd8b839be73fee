//! Database client seam.
//!
//! The wrapper and the pool talk to the server only through these traits:
//! - `Connector` - opens a configured connection
//! - `Connection` - runs statements and transaction control on one link
//!
//! The production backend is [`MySqlConnector`], built on the `mysql` crate.

pub mod mysql_client;

#[cfg(test)]
pub(crate) mod mock;

use crate::error::DriverError;
use crate::models::{ConnectionConfig, Row};

pub use mysql_client::{MySqlConnection, MySqlConnector};

/// Trivial statement used purely to test liveness.
pub const PROBE_STATEMENT: &str = "SELECT 1";

/// Columns and rows read from one result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    /// Column names in server order
    pub columns: Vec<String>,
    /// Rows, already converted to text
    pub rows: Vec<Row>,
}

/// One live link to the server.
pub trait Connection: Send {
    /// Run a statement that produces rows.
    ///
    /// At most `max_rows` rows are kept when it is non-zero; the rest are read
    /// and discarded so the link stays usable.
    fn query(&mut self, sql: &str, max_rows: usize) -> Result<RowSet, DriverError>;

    /// Run a statement with positional parameters bound by the server.
    fn query_bound(
        &mut self,
        sql: &str,
        params: &[String],
        max_rows: usize,
    ) -> Result<RowSet, DriverError>;

    /// Run a statement and return the affected row count.
    fn execute(&mut self, sql: &str) -> Result<u64, DriverError>;

    /// Toggle auto-commit mode.
    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Whether the link is known to be closed.
    ///
    /// A `false` answer does not prove the server is reachable; use
    /// [`probe`](Connection::probe) for that.
    fn is_closed(&self) -> bool;

    /// Close the link.
    fn close(&mut self) -> Result<(), DriverError>;

    /// Limit how long the server lets a statement run (0 = unlimited).
    fn set_query_timeout(&mut self, secs: u32) -> Result<(), DriverError> {
        let millis = u64::from(secs) * 1000;
        self.execute(&format!("SET SESSION max_execution_time = {millis}")).map(|_| ())
    }

    /// Issue the probe statement.
    fn probe(&mut self) -> Result<(), DriverError> {
        self.query(PROBE_STATEMENT, 0).map(|_| ())
    }
}

/// Opens connections for a configuration.
///
/// Implementations apply every option in the config: timeouts, schema,
/// character set and TLS material.
pub trait Connector: Send + Sync {
    /// Connection type produced.
    type Connection: Connection;

    /// Open and configure a new connection.
    fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, DriverError>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Close a connection, swallowing any error.
pub(crate) fn close_quietly<C: Connection>(conn: &mut C) {
    if conn.is_closed() {
        return;
    }
    if let Err(e) = conn.close() {
        tracing::debug!(error = %e, "Ignoring error while closing connection");
    }
}
