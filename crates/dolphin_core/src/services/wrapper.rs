//! Single-connection manager.
//!
//! [`ConnectionWrapper`] owns at most one live connection. Every public
//! operation holds the session mutex for its whole duration, so statements,
//! transaction steps and reconnects never interleave. Before each statement the
//! link is validated and, if it is dead, reconnected exactly once with the last
//! configuration that connected successfully.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::driver::{Connection, Connector, MySqlConnector, RowSet};
use crate::error::{DolphinError, DriverError};
use crate::models::{ConnectionConfig, QueryResult, QueryStatistics, StatisticsSnapshot};
use crate::sanitizer::SqlSanitizer;
use crate::services::transaction::TransactionGuard;

/// Receives human-readable status and error lines.
pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Message used when the injection heuristic rejects a template.
pub const INJECTION_REJECTED: &str = "Potential SQL injection detected";

/// What a statement is expected to produce.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Statement<'a> {
    /// Rows are read and returned.
    Query(&'a str),
    /// Only the affected-row count is read.
    Execute(&'a str),
    /// Rows are read; parameters are bound by the server.
    Bound { sql: &'a str, params: &'a [String] },
}

impl Statement<'_> {
    fn operation(&self) -> &'static str {
        match self {
            Self::Query(_) => "Query",
            Self::Execute(_) => "Execute",
            Self::Bound { .. } => "Prepared statement",
        }
    }
}

/// Run one statement on a live connection and record it in `statistics`.
///
/// Driver failures come back as a failed [`QueryResult`] whose message names
/// the operation and carries the server's code and SQLSTATE.
pub(crate) fn run_statement<T: Connection>(
    conn: &mut T,
    statement: Statement<'_>,
    max_rows: usize,
    statistics: &QueryStatistics,
) -> QueryResult {
    let start = Instant::now();

    let outcome = match statement {
        Statement::Query(sql) => conn.query(sql, max_rows).map(|set| (set, None)),
        Statement::Bound { sql, params } => {
            conn.query_bound(sql, params, max_rows).map(|set| (set, None))
        }
        Statement::Execute(sql) => conn.execute(sql).map(|n| (RowSet::default(), Some(n))),
    };

    let mut result = match outcome {
        Ok((set, affected)) => QueryResult {
            affected_rows: affected.unwrap_or(set.rows.len() as u64),
            columns: set.columns,
            rows: set.rows,
            success: true,
            ..QueryResult::default()
        },
        Err(e) => {
            let err = DolphinError::query_from(statement.operation(), e);
            tracing::warn!(error = %err, "Statement failed");
            QueryResult::failure(err.to_string())
        }
    };

    statistics.record(result.success);
    result.execution_time = start.elapsed();

    tracing::debug!(
        operation = statement.operation(),
        success = result.success,
        row_count = result.rows.len(),
        execution_time_ms = result.execution_time_ms(),
        "Statement completed"
    );

    result
}

/// State guarded by the session mutex.
pub(crate) struct Session<T> {
    pub(crate) connection: Option<T>,
    current_config: Option<ConnectionConfig>,
    last_successful: Option<ConnectionConfig>,
}

/// Manages one connection with serialized access, reconnect policy and
/// running statistics.
///
/// The wrapper is a context object: share it by reference (or `Arc`) with
/// every caller that needs the connection.
pub struct ConnectionWrapper<C: Connector = MySqlConnector> {
    connector: C,
    session: Mutex<Session<C::Connection>>,
    connected: AtomicBool,
    max_result_rows: AtomicUsize,
    statistics: QueryStatistics,
    last_error: Mutex<String>,
    log_callback: RwLock<Option<LogCallback>>,
}

impl ConnectionWrapper {
    /// Create a wrapper using the MySQL client.
    pub fn new() -> Self {
        Self::with_connector(MySqlConnector::new())
    }
}

impl Default for ConnectionWrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> fmt::Debug for ConnectionWrapper<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionWrapper")
            .field("backend", &self.connector.name())
            .field("connected", &self.is_connected())
            .field("statistics", &self.statistics.snapshot())
            .finish()
    }
}

impl<C: Connector> ConnectionWrapper<C> {
    /// Create a wrapper over a specific backend.
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector,
            session: Mutex::new(Session {
                connection: None,
                current_config: None,
                last_successful: None,
            }),
            connected: AtomicBool::new(false),
            max_result_rows: AtomicUsize::new(0),
            statistics: QueryStatistics::new(),
            last_error: Mutex::new(String::new()),
            log_callback: RwLock::new(None),
        }
    }

    // ========== Connection Lifecycle ==========

    /// Connect with the given configuration, closing any existing connection.
    pub fn connect(&self, config: &ConnectionConfig) -> Result<(), DolphinError> {
        let mut session = self.session.lock();
        self.connect_locked(&mut session, config)
    }

    /// Close the connection. Does nothing if already disconnected.
    pub fn disconnect(&self) {
        let mut session = self.session.lock();
        self.disconnect_locked(&mut session);
    }

    /// Reconnect with the last configuration that connected successfully.
    ///
    /// Makes up to `max_retries` attempts (at least one).
    pub fn reconnect(&self) -> Result<(), DolphinError> {
        self.log("Attempting to reconnect...");
        let mut session = self.session.lock();
        let Some(attempts) = session.last_successful.as_ref().map(|c| c.max_retries.max(1)) else {
            let err = DolphinError::connection(NO_PREVIOUS_CONFIG);
            self.log_error(&err.to_string());
            return Err(err);
        };

        let mut last_err = DolphinError::NotConnected;
        for attempt in 1..=attempts {
            match self.reconnect_locked(&mut session) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(attempt, attempts, error = %e, "Reconnect attempt failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Check that the server answers the probe statement.
    pub fn ping(&self) -> bool {
        let mut session = self.session.lock();
        session.connection.as_mut().is_some_and(|conn| conn.probe().is_ok())
    }

    /// Whether a connection is currently held. Does not take the session lock.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// `user@host:port/database` of the current connection.
    pub fn connection_info(&self) -> String {
        if !self.is_connected() {
            return "Not connected".to_string();
        }
        self.session
            .lock()
            .current_config
            .as_ref()
            .map_or_else(|| "Not connected".to_string(), ConnectionConfig::connection_info)
    }

    // ========== Statement Execution ==========

    /// Run a statement and report the affected-row count.
    pub fn execute(&self, sql: &str) -> QueryResult {
        self.run_validated(Statement::Execute(sql))
    }

    /// Run a statement that returns rows.
    pub fn query(&self, sql: &str) -> QueryResult {
        self.run_validated(Statement::Query(sql))
    }

    /// Fill `?` placeholders textually and run the result as a query.
    ///
    /// The template is checked with the injection heuristic first; a flagged
    /// template never reaches the server.
    pub fn execute_parameterized<S: AsRef<str>>(&self, template: &str, params: &[S]) -> QueryResult {
        if SqlSanitizer::detect_sql_injection(template) {
            self.log_error(INJECTION_REJECTED);
            return QueryResult::failure(INJECTION_REJECTED);
        }
        let sql = SqlSanitizer::build_parameterized_query(template, params);
        self.query(&sql)
    }

    /// Run a query with parameters bound by the server.
    pub fn execute_bound(&self, sql: &str, params: &[String]) -> QueryResult {
        self.run_validated(Statement::Bound { sql, params })
    }

    /// Run each statement independently, one result per statement.
    ///
    /// A failed statement does not stop the batch.
    pub fn execute_batch<S: AsRef<str>>(&self, statements: &[S]) -> Vec<QueryResult> {
        statements.iter().map(|sql| self.execute(sql.as_ref())).collect()
    }

    /// Cap the rows kept from each query (0 = unlimited).
    ///
    /// Rows beyond the cap are discarded without an error.
    pub fn set_result_limit(&self, max_rows: usize) {
        self.max_result_rows.store(max_rows, Ordering::Relaxed);
    }

    /// Change the per-statement timeout, in seconds (0 = none).
    ///
    /// Applied to the live link and written into the stored configuration, so
    /// a later reconnect opens with the new read timeout.
    pub fn set_query_timeout(&self, secs: u32) {
        let mut session = self.session.lock();
        let session = &mut *session;
        for config in [&mut session.current_config, &mut session.last_successful] {
            if let Some(config) = config {
                config.read_timeout_secs = secs;
            }
        }
        if let Some(conn) = session.connection.as_mut().filter(|conn| !conn.is_closed()) {
            if let Err(e) = conn.set_query_timeout(secs) {
                tracing::warn!(error = %e, secs, "Failed to apply query timeout");
            }
        }
        tracing::debug!(secs, "Query timeout updated");
    }

    // ========== Transaction Control ==========

    /// Disable auto-commit on the live connection.
    pub fn begin_transaction(&self) -> Result<(), DolphinError> {
        let mut session = self.session.lock();
        let conn = session.connection.as_mut().ok_or(DolphinError::NotConnected)?;
        conn.set_auto_commit(false)
            .map_err(|e| self.transaction_failed("Begin transaction error", e))?;
        self.log("Transaction started");
        Ok(())
    }

    /// Commit and restore auto-commit.
    pub fn commit_transaction(&self) -> Result<(), DolphinError> {
        let mut session = self.session.lock();
        let conn = session.connection.as_mut().ok_or(DolphinError::NotConnected)?;
        let committed = conn.commit();
        let restored = conn.set_auto_commit(true);
        committed
            .and(restored)
            .map_err(|e| self.transaction_failed("Commit transaction error", e))?;
        self.log("Transaction committed");
        Ok(())
    }

    /// Roll back and restore auto-commit.
    pub fn rollback_transaction(&self) -> Result<(), DolphinError> {
        let mut session = self.session.lock();
        let conn = session.connection.as_mut().ok_or(DolphinError::NotConnected)?;
        let rolled_back = conn.rollback();
        let restored = conn.set_auto_commit(true);
        rolled_back
            .and(restored)
            .map_err(|e| self.transaction_failed("Rollback transaction error", e))?;
        self.log("Transaction rolled back");
        Ok(())
    }

    /// Start a scoped transaction on the live connection.
    ///
    /// The guard holds the session lock until it is dropped: other callers
    /// queue behind it, and statements in the transaction must go through the
    /// guard. Calling wrapper methods from the thread that holds the guard
    /// deadlocks.
    pub fn transaction(&self) -> Result<TransactionGuard<'_, C>, DolphinError> {
        let session = self.session.lock();
        TransactionGuard::begin(self, session)
    }

    /// Run `work` inside a transaction.
    ///
    /// Commits when `work` returns `Ok(true)`, rolls back on `Ok(false)` or
    /// `Err`. Returns whether the transaction committed. If `work` panics the
    /// guard rolls back while unwinding.
    pub fn run_in_transaction<F, E>(&self, work: F) -> bool
    where
        F: FnOnce(&mut TransactionGuard<'_, C>) -> Result<bool, E>,
        E: fmt::Display,
    {
        let mut guard = match self.transaction() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(error = %e, "Could not start transaction");
                return false;
            }
        };

        match work(&mut guard) {
            Ok(true) => guard.commit().is_ok(),
            Ok(false) => {
                if let Err(e) = guard.rollback() {
                    tracing::warn!(error = %e, "Rollback after declined work failed");
                }
                false
            }
            Err(e) => {
                self.log_error(&format!("Transaction aborted: {e}"));
                if let Err(e) = guard.rollback() {
                    tracing::warn!(error = %e, "Rollback after failed work failed");
                }
                false
            }
        }
    }

    // ========== Helpers & Observability ==========

    /// Escape text for use inside a quoted literal.
    pub fn escape_string(&self, input: &str) -> String {
        SqlSanitizer::escape_string(input)
    }

    /// `true` if the text passes the injection heuristic.
    pub fn validate_sql(&self, sql: &str) -> bool {
        !SqlSanitizer::detect_sql_injection(sql)
    }

    /// Most recent error message (empty after a success).
    pub fn last_error(&self) -> String {
        self.last_error.lock().clone()
    }

    /// Install the callback that receives status lines.
    ///
    /// The callback may run while the session lock is held, so it must not
    /// call back into the wrapper.
    pub fn set_log_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.log_callback.write() = Some(Arc::new(callback));
    }

    /// Current statement counters. Does not take the session lock.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }

    /// Zero the statement counters.
    pub fn reset_statistics(&self) {
        self.statistics.reset();
    }

    pub(crate) fn max_result_rows(&self) -> usize {
        self.max_result_rows.load(Ordering::Relaxed)
    }

    pub(crate) fn query_statistics(&self) -> &QueryStatistics {
        &self.statistics
    }

    /// Send a status line to the callback.
    pub(crate) fn log(&self, message: &str) {
        tracing::debug!(message, "Status");
        let callback = self.log_callback.read().clone();
        if let Some(callback) = callback {
            callback(message);
        }
    }

    /// Record an error as the last error and send it to the callback.
    pub(crate) fn log_error(&self, message: &str) {
        tracing::error!(error = message, "Database error");
        *self.last_error.lock() = message.to_string();
        let callback = self.log_callback.read().clone();
        if let Some(callback) = callback {
            callback(&format!("Error: {message}"));
        }
    }

    /// Drop the connected flag once a failed statement has left the link closed.
    pub(crate) fn note_link_state(&self, conn: &C::Connection) {
        if conn.is_closed() {
            tracing::warn!("Connection closed by a failed statement");
            self.connected.store(false, Ordering::Release);
        }
    }

    fn transaction_failed(&self, context: &str, err: DriverError) -> DolphinError {
        let err = DolphinError::transaction(format!("{context}: {err}"));
        self.log_error(&err.to_string());
        err
    }

    // ========== Internal (session lock held) ==========

    fn connect_locked(
        &self,
        session: &mut Session<C::Connection>,
        config: &ConnectionConfig,
    ) -> Result<(), DolphinError> {
        self.disconnect_locked(session);
        session.current_config = Some(config.clone());

        if let Err(e) = config.validate() {
            self.log_error(&e.to_string());
            return Err(e);
        }

        match self.connector.connect(config) {
            Ok(conn) => {
                session.connection = Some(conn);
                session.last_successful = Some(config.clone());
                self.connected.store(true, Ordering::Release);
                self.last_error.lock().clear();

                // Note: password is intentionally not logged
                tracing::info!(
                    backend = self.connector.name(),
                    host = %config.host,
                    port = config.port,
                    database = %config.database,
                    "Connected"
                );
                self.log(&format!("Connected to {}:{}", config.host, config.port));
                Ok(())
            }
            Err(e) => {
                let err = DolphinError::connection_from(e);
                self.log_error(&err.to_string());
                Err(err)
            }
        }
    }

    fn disconnect_locked(&self, session: &mut Session<C::Connection>) {
        self.connected.store(false, Ordering::Release);
        let Some(mut conn) = session.connection.take() else {
            return;
        };
        if let Err(e) = conn.close() {
            self.log_error(&format!("Disconnect error: {e}"));
        }
        tracing::info!("Disconnected");
        self.log("Disconnected from database");
    }

    fn reconnect_locked(&self, session: &mut Session<C::Connection>) -> Result<(), DolphinError> {
        self.disconnect_locked(session);
        let Some(config) = session.last_successful.clone() else {
            let err = DolphinError::connection(NO_PREVIOUS_CONFIG);
            self.log_error(&err.to_string());
            return Err(err);
        };
        self.connect_locked(session, &config)
    }

    /// Make sure the link is usable, reconnecting once if it is not.
    fn validate_locked(&self, session: &mut Session<C::Connection>) -> Result<(), DolphinError> {
        let healthy = match session.connection.as_mut() {
            None => false,
            Some(conn) if conn.is_closed() => false,
            Some(conn) => conn.probe().is_ok(),
        };
        if healthy {
            return Ok(());
        }

        self.log_error("Connection lost, attempting to reconnect...");
        self.reconnect_locked(session)
    }

    fn run_validated(&self, statement: Statement<'_>) -> QueryResult {
        let start = Instant::now();
        let mut session = self.session.lock();

        if let Err(e) = self.validate_locked(&mut session) {
            self.statistics.record(false);
            let mut result = QueryResult::failure(format!("Connection validation failed: {e}"));
            result.execution_time = start.elapsed();
            self.log_error(&result.error_message);
            return result;
        }

        let Some(conn) = session.connection.as_mut() else {
            self.statistics.record(false);
            return QueryResult::failure(DolphinError::NotConnected.to_string());
        };

        let result = run_statement(conn, statement, self.max_result_rows(), &self.statistics);
        if result.success {
            self.last_error.lock().clear();
        } else {
            self.note_link_state(conn);
            self.log_error(&result.error_message);
        }
        result
    }
}

impl<C: Connector> Drop for ConnectionWrapper<C> {
    fn drop(&mut self) {
        if let Some(mut conn) = self.session.get_mut().connection.take() {
            crate::driver::close_quietly(&mut conn);
        }
    }
}

const NO_PREVIOUS_CONFIG: &str = "No previous connection configuration available";
