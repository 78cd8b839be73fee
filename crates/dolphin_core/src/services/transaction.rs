//! Scoped transactions.
//!
//! A [`TransactionGuard`] holds the wrapper's session lock from begin until it
//! is dropped. If it is dropped without commit or rollback, the transaction
//! rolls back and auto-commit is restored, errors swallowed.

use parking_lot::MutexGuard;

use crate::driver::{Connection, Connector};
use crate::error::DolphinError;
use crate::models::QueryResult;
use crate::sanitizer::SqlSanitizer;
use crate::services::wrapper::{
    run_statement, ConnectionWrapper, Session, Statement, INJECTION_REJECTED,
};

/// A transaction in progress on a [`ConnectionWrapper`].
///
/// Obtained from [`ConnectionWrapper::transaction`]. Statements belonging to
/// the transaction run through the guard; they are not validated or
/// reconnected, since a reconnect would silently drop the open transaction.
#[must_use = "the transaction rolls back as soon as the guard is dropped"]
pub struct TransactionGuard<'a, C: Connector> {
    wrapper: &'a ConnectionWrapper<C>,
    session: MutexGuard<'a, Session<C::Connection>>,
    committed: bool,
    rolled_back: bool,
}

impl<'a, C: Connector> TransactionGuard<'a, C> {
    /// Disable auto-commit on the session's connection.
    pub(crate) fn begin(
        wrapper: &'a ConnectionWrapper<C>,
        mut session: MutexGuard<'a, Session<C::Connection>>,
    ) -> Result<Self, DolphinError> {
        let conn = match session.connection.as_mut() {
            Some(conn) if !conn.is_closed() => conn,
            _ => return Err(DolphinError::NotConnected),
        };

        if let Err(e) = conn.set_auto_commit(false) {
            let err = DolphinError::transaction(format!("Begin transaction error: {e}"));
            wrapper.log_error(&err.to_string());
            return Err(err);
        }

        wrapper.log("Transaction started");
        Ok(Self { wrapper, session, committed: false, rolled_back: false })
    }

    /// Whether neither commit nor rollback has happened yet.
    pub fn is_active(&self) -> bool {
        !self.committed && !self.rolled_back
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back
    }

    /// Run a statement inside the transaction.
    pub fn execute(&mut self, sql: &str) -> QueryResult {
        self.run(Statement::Execute(sql))
    }

    /// Run a row-returning statement inside the transaction.
    pub fn query(&mut self, sql: &str) -> QueryResult {
        self.run(Statement::Query(sql))
    }

    /// Run a query with server-bound parameters inside the transaction.
    pub fn execute_bound(&mut self, sql: &str, params: &[String]) -> QueryResult {
        self.run(Statement::Bound { sql, params })
    }

    /// Fill `?` placeholders textually and run the query inside the transaction.
    pub fn execute_parameterized<S: AsRef<str>>(&mut self, template: &str, params: &[S]) -> QueryResult {
        if SqlSanitizer::detect_sql_injection(template) {
            self.wrapper.log_error(INJECTION_REJECTED);
            return QueryResult::failure(INJECTION_REJECTED);
        }
        let sql = SqlSanitizer::build_parameterized_query(template, params);
        self.run(Statement::Query(&sql))
    }

    /// Commit the transaction. No-op once resolved.
    ///
    /// On failure the guard stays active and rolls back when dropped.
    pub fn commit(&mut self) -> Result<(), DolphinError> {
        if !self.is_active() {
            return Ok(());
        }
        let conn = self.session.connection.as_mut().ok_or(DolphinError::NotConnected)?;

        if let Err(e) = conn.commit() {
            let err = DolphinError::transaction(format!("Commit transaction error: {e}"));
            self.wrapper.log_error(&err.to_string());
            return Err(err);
        }
        self.committed = true;

        if let Err(e) = conn.set_auto_commit(true) {
            tracing::warn!(error = %e, "Failed to restore auto-commit after commit");
        }
        self.wrapper.log("Transaction committed");
        Ok(())
    }

    /// Roll back the transaction. No-op once resolved.
    pub fn rollback(&mut self) -> Result<(), DolphinError> {
        if !self.is_active() {
            return Ok(());
        }
        let conn = self.session.connection.as_mut().ok_or(DolphinError::NotConnected)?;

        // Resolved even if the rollback itself fails.
        self.rolled_back = true;
        let outcome = conn.rollback();
        if let Err(e) = conn.set_auto_commit(true) {
            tracing::warn!(error = %e, "Failed to restore auto-commit after rollback");
        }

        match outcome {
            Ok(()) => {
                self.wrapper.log("Transaction rolled back");
                Ok(())
            }
            Err(e) => {
                let err = DolphinError::transaction(format!("Rollback transaction error: {e}"));
                self.wrapper.log_error(&err.to_string());
                Err(err)
            }
        }
    }

    fn run(&mut self, statement: Statement<'_>) -> QueryResult {
        if !self.is_active() {
            return QueryResult::failure("Transaction is no longer active");
        }
        let Some(conn) = self.session.connection.as_mut() else {
            return QueryResult::failure(DolphinError::NotConnected.to_string());
        };

        let result = run_statement(
            conn,
            statement,
            self.wrapper.max_result_rows(),
            self.wrapper.query_statistics(),
        );
        if !result.success {
            self.wrapper.note_link_state(conn);
            self.wrapper.log_error(&result.error_message);
        }
        result
    }
}

impl<C: Connector> Drop for TransactionGuard<'_, C> {
    fn drop(&mut self) {
        if !self.is_active() {
            return;
        }
        let Some(conn) = self.session.connection.as_mut() else {
            return;
        };

        if let Err(e) = conn.rollback() {
            tracing::warn!(error = %e, "Rollback of abandoned transaction failed");
        }
        if let Err(e) = conn.set_auto_commit(true) {
            tracing::warn!(error = %e, "Failed to restore auto-commit");
        }
        self.rolled_back = true;
        self.wrapper.log("Transaction rolled back");
    }
}
