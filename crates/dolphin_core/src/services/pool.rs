//! Bounded connection pool.
//!
//! Provides connection reuse with:
//! - A hard cap on connections (idle plus checked out)
//! - Health check before handing out an idle connection
//! - Idle eviction after a configurable timeout
//!
//! The pool lock only guards slot bookkeeping. Opening, probing and closing
//! connections happen outside it.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::driver::{close_quietly, Connection, Connector, MySqlConnector};
use crate::error::DolphinError;
use crate::models::{ConnectionConfig, PoolStatus, QueryResult, QueryStatistics, StatisticsSnapshot};
use crate::services::wrapper::{run_statement, Statement};

/// Default pool capacity.
pub const DEFAULT_MAX_POOL_SIZE: usize = 10;

/// Default time an idle connection is kept before eviction.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// One unit of capacity.
///
/// `in_use` with no connection means reserved: either the connection is
/// checked out or one is being opened for a caller.
struct PoolSlot<T> {
    connection: Option<T>,
    last_used: Instant,
    in_use: bool,
}

impl<T> PoolSlot<T> {
    fn reserved() -> Self {
        Self { connection: None, last_used: Instant::now(), in_use: true }
    }

    fn idle(connection: T) -> Self {
        Self { connection: Some(connection), last_used: Instant::now(), in_use: false }
    }

    fn is_idle(&self) -> bool {
        !self.in_use && self.connection.is_some()
    }

    fn is_vacant(&self) -> bool {
        !self.in_use && self.connection.is_none()
    }

    fn is_reserved(&self) -> bool {
        self.in_use && self.connection.is_none()
    }
}

enum Checkout<T> {
    Reused(T),
    Fresh,
}

/// A fixed-capacity pool of connections sharing one configuration.
pub struct ConnectionPool<C: Connector = MySqlConnector> {
    connector: C,
    config: ConnectionConfig,
    max_size: usize,
    idle_timeout: Duration,
    slots: Mutex<Vec<PoolSlot<C::Connection>>>,
    statistics: QueryStatistics,
}

impl ConnectionPool {
    /// Create a MySQL pool with the given capacity.
    pub fn new(config: ConnectionConfig, max_size: usize) -> Result<Self, DolphinError> {
        Self::with_connector(MySqlConnector::new(), config, max_size)
    }
}

impl<C: Connector> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("backend", &self.connector.name())
            .field("config", &self.config)
            .field("idle_timeout", &self.idle_timeout)
            .field("status", &self.status())
            .finish()
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Create a pool over a specific backend.
    ///
    /// No connection is opened until the first acquire.
    pub fn with_connector(
        connector: C,
        config: ConnectionConfig,
        max_size: usize,
    ) -> Result<Self, DolphinError> {
        config.validate()?;
        if max_size == 0 {
            return Err(DolphinError::config("Pool size must be at least 1"));
        }

        tracing::info!(
            backend = connector.name(),
            host = %config.host,
            database = %config.database,
            max_size,
            "Connection pool created"
        );

        Ok(Self {
            connector,
            config,
            max_size,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            slots: Mutex::new(Vec::with_capacity(max_size)),
            statistics: QueryStatistics::new(),
        })
    }

    /// Set how long an idle connection is kept before eviction.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Check out a connection.
    ///
    /// Prefers a healthy idle connection; idle connections that fail the
    /// health check are closed and their slot freed. Opens a new connection
    /// when under capacity. Fails with [`DolphinError::PoolExhausted`] when
    /// every slot is checked out; does not wait.
    pub fn acquire(&self) -> Result<PooledConnection<'_, C>, DolphinError> {
        loop {
            match self.reserve()? {
                Checkout::Reused(mut conn) => {
                    if !conn.is_closed() && conn.probe().is_ok() {
                        return Ok(PooledConnection { pool: self, conn: Some(conn) });
                    }
                    tracing::debug!("Discarding idle connection that failed its health check");
                    close_quietly(&mut conn);
                    self.free_reserved();
                }
                Checkout::Fresh => {
                    return match self.connector.connect(&self.config) {
                        Ok(conn) => {
                            tracing::debug!(max_size = self.max_size, "Opened pooled connection");
                            Ok(PooledConnection { pool: self, conn: Some(conn) })
                        }
                        Err(e) => {
                            self.free_reserved();
                            Err(DolphinError::connection_from(e))
                        }
                    };
                }
            }
        }
    }

    /// Return a connection to the pool.
    ///
    /// Same as dropping it.
    pub fn release(&self, conn: PooledConnection<'_, C>) {
        drop(conn);
    }

    /// Close idle connections unused for longer than the idle timeout.
    ///
    /// Checked-out connections are never touched. Returns how many
    /// connections were closed.
    pub fn clean_idle_connections(&self) -> usize {
        let now = Instant::now();
        let mut evicted = Vec::new();
        {
            let mut slots = self.slots.lock();
            for slot in slots.iter_mut().filter(|s| s.is_idle()) {
                if now.duration_since(slot.last_used) >= self.idle_timeout {
                    evicted.extend(slot.connection.take());
                }
            }
            slots.retain(|slot| !slot.is_vacant());
        }

        let count = evicted.len();
        for mut conn in evicted {
            close_quietly(&mut conn);
        }
        if count > 0 {
            tracing::info!(count, "Evicted idle pooled connections");
        }
        count
    }

    /// Get current pool status.
    pub fn status(&self) -> PoolStatus {
        let slots = self.slots.lock();
        let idle = slots.iter().filter(|s| s.is_idle()).count();
        let in_use = slots.iter().filter(|s| s.in_use).count();
        PoolStatus { max_size: self.max_size, size: idle + in_use, idle, in_use }
    }

    /// Counters for statements run through pooled connections.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }

    /// Claim an idle connection or a slot for a new one.
    fn reserve(&self) -> Result<Checkout<C::Connection>, DolphinError> {
        let mut slots = self.slots.lock();

        if let Some(slot) = slots.iter_mut().find(|s| s.is_idle()) {
            if let Some(conn) = slot.connection.take() {
                slot.in_use = true;
                slot.last_used = Instant::now();
                return Ok(Checkout::Reused(conn));
            }
        }

        if let Some(slot) = slots.iter_mut().find(|s| s.is_vacant()) {
            slot.in_use = true;
            slot.last_used = Instant::now();
            return Ok(Checkout::Fresh);
        }

        if slots.len() < self.max_size {
            slots.push(PoolSlot::reserved());
            return Ok(Checkout::Fresh);
        }

        tracing::warn!(max_size = self.max_size, "Connection pool exhausted");
        Err(DolphinError::pool_exhausted(self.max_size))
    }

    fn free_reserved(&self) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.iter_mut().find(|s| s.is_reserved()) {
            slot.in_use = false;
        }
    }

    /// Put a checked-out connection back, or close it if it is unhealthy.
    fn check_in(&self, mut conn: C::Connection) {
        let healthy = !conn.is_closed() && conn.probe().is_ok();

        let mut slots = self.slots.lock();
        let Some(slot) = slots.iter_mut().find(|s| s.is_reserved()) else {
            drop(slots);
            tracing::warn!("Released connection has no reserved slot, closing it");
            close_quietly(&mut conn);
            return;
        };

        if healthy {
            *slot = PoolSlot::idle(conn);
        } else {
            slot.in_use = false;
            drop(slots);
            tracing::debug!("Closing unhealthy connection on release");
            close_quietly(&mut conn);
        }
    }
}

impl<C: Connector> Drop for ConnectionPool<C> {
    fn drop(&mut self) {
        let slots = self.slots.get_mut();
        for slot in slots.iter_mut() {
            if let Some(mut conn) = slot.connection.take() {
                close_quietly(&mut conn);
            }
        }
        tracing::info!("Connection pool closed");
    }
}

/// A connection checked out of a [`ConnectionPool`].
///
/// Returns to the pool when dropped.
pub struct PooledConnection<'a, C: Connector> {
    pool: &'a ConnectionPool<C>,
    conn: Option<C::Connection>,
}

impl<C: Connector> PooledConnection<'_, C> {
    /// Run a row-returning statement.
    pub fn query(&mut self, sql: &str) -> QueryResult {
        self.run(Statement::Query(sql))
    }

    /// Run a statement and report the affected-row count.
    pub fn execute(&mut self, sql: &str) -> QueryResult {
        self.run(Statement::Execute(sql))
    }

    /// Run a query with parameters bound by the server.
    pub fn execute_bound(&mut self, sql: &str, params: &[String]) -> QueryResult {
        self.run(Statement::Bound { sql, params })
    }

    /// Check that the server answers the probe statement.
    pub fn ping(&mut self) -> bool {
        self.conn.as_mut().is_some_and(|conn| conn.probe().is_ok())
    }

    /// Borrow the underlying driver connection.
    pub fn connection(&self) -> Option<&C::Connection> {
        self.conn.as_ref()
    }

    /// Mutably borrow the underlying driver connection.
    pub fn connection_mut(&mut self) -> Option<&mut C::Connection> {
        self.conn.as_mut()
    }

    fn run(&mut self, statement: Statement<'_>) -> QueryResult {
        match self.conn.as_mut() {
            Some(conn) => run_statement(conn, statement, 0, &self.pool.statistics),
            None => QueryResult::failure(DolphinError::NotConnected.to_string()),
        }
    }
}

impl<C: Connector> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.check_in(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::driver::mock::MockConnector;

    fn mock_pool(max_size: usize) -> (ConnectionPool<MockConnector>, MockConnector) {
        let connector = MockConnector::new();
        let pool =
            ConnectionPool::with_connector(connector.clone(), ConnectionConfig::default(), max_size)
                .unwrap();
        (pool, connector)
    }

    fn id_of(conn: &PooledConnection<'_, MockConnector>) -> usize {
        conn.connection().unwrap().id
    }

    #[test]
    fn test_defaults() {
        let (pool, _) = mock_pool(DEFAULT_MAX_POOL_SIZE);
        assert_eq!(pool.max_size(), 10);
        assert_eq!(pool.idle_timeout(), Duration::from_secs(300));
        assert_eq!(pool.status(), PoolStatus { max_size: 10, size: 0, idle: 0, in_use: 0 });
    }

    #[test]
    fn test_rejects_zero_capacity_and_bad_config() {
        assert!(ConnectionPool::with_connector(MockConnector::new(), ConnectionConfig::default(), 0)
            .is_err());
        let config = ConnectionConfig { host: String::new(), ..ConnectionConfig::default() };
        assert!(ConnectionPool::with_connector(MockConnector::new(), config, 2).is_err());
    }

    #[test]
    fn test_exhaustion_at_capacity() {
        let (pool, connector) = mock_pool(2);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let err = pool.acquire().err().unwrap();

        assert!(matches!(err, DolphinError::PoolExhausted { max_size: 2 }));
        assert_eq!(connector.connect_attempts(), 2);
        assert_eq!(pool.status(), PoolStatus { max_size: 2, size: 2, idle: 0, in_use: 2 });

        drop(a);
        assert!(pool.acquire().is_ok());
        drop(b);
    }

    #[test]
    fn test_released_connection_is_reused() {
        let (pool, connector) = mock_pool(2);

        let first = pool.acquire().unwrap();
        let id = id_of(&first);
        pool.release(first);
        assert_eq!(pool.status().idle, 1);

        let again = pool.acquire().unwrap();
        assert_eq!(id_of(&again), id);
        assert_eq!(connector.connect_attempts(), 1);
    }

    #[test]
    fn test_unhealthy_release_is_closed() {
        let (pool, connector) = mock_pool(2);

        let conn = pool.acquire().unwrap();
        let id = id_of(&conn);
        connector.break_link(id);
        drop(conn);

        assert!(connector.closed_ids().contains(&id));
        assert_eq!(pool.status(), PoolStatus { max_size: 2, size: 0, idle: 0, in_use: 0 });

        let fresh = pool.acquire().unwrap();
        assert_ne!(id_of(&fresh), id);
    }

    #[test]
    fn test_idle_connection_failing_health_check_is_replaced() {
        let (pool, connector) = mock_pool(1);

        let conn = pool.acquire().unwrap();
        let id = id_of(&conn);
        drop(conn);
        connector.close_link(id);

        let replacement = pool.acquire().unwrap();
        assert_ne!(id_of(&replacement), id);
        assert_eq!(pool.status().size, 1);
    }

    #[test]
    fn test_failed_connect_frees_slot() {
        let (pool, connector) = mock_pool(1);
        connector.refuse_connections(true);

        assert!(matches!(pool.acquire().err(), Some(DolphinError::Connection { .. })));
        assert_eq!(pool.status().in_use, 0);

        connector.refuse_connections(false);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_idle_eviction() {
        let (pool, connector) = mock_pool(3);
        let pool = pool.with_idle_timeout(Duration::ZERO);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let (id_a, id_b) = (id_of(&a), id_of(&b));
        drop(a);
        drop(b);

        assert_eq!(pool.clean_idle_connections(), 2);
        assert!(connector.closed_ids().contains(&id_a));
        assert!(connector.closed_ids().contains(&id_b));
        assert_eq!(pool.status().size, 0);

        // Evicted connections are never handed out again
        let c = pool.acquire().unwrap();
        assert!(id_of(&c) > id_b);
    }

    #[test]
    fn test_cleanup_never_frees_checked_out_slots() {
        let (pool, connector) = mock_pool(2);
        let pool = pool.with_idle_timeout(Duration::ZERO);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.clean_idle_connections(), 0);
        assert!(pool.acquire().is_err());
        assert!(connector.closed_ids().is_empty());

        drop(a);
        drop(b);
        assert_eq!(pool.status().idle, 2);
    }

    #[test]
    fn test_recent_connections_survive_cleanup() {
        let (pool, _) = mock_pool(2);

        drop(pool.acquire().unwrap());
        assert_eq!(pool.clean_idle_connections(), 0);
        assert_eq!(pool.status().idle, 1);
    }

    #[test]
    fn test_pooled_statements() {
        let (pool, connector) = mock_pool(1);
        connector.respond("FROM items", &["id"], &[&["1"], &["2"]]);

        let mut conn = pool.acquire().unwrap();
        assert!(conn.ping());
        assert_eq!(conn.query("SELECT id FROM items").row_count(), 2);
        assert_eq!(conn.execute("DELETE FROM items").affected_rows, 1);
        drop(conn);

        assert_eq!(pool.statistics().total, 2);
    }

    #[test]
    fn test_drop_closes_idle_connections() {
        let (pool, connector) = mock_pool(2);
        let id = {
            let conn = pool.acquire().unwrap();
            id_of(&conn)
        };
        drop(pool);
        assert!(connector.closed_ids().contains(&id));
    }

    #[test]
    fn test_capacity_holds_under_contention() {
        let (pool, _) = mock_pool(3);
        let checked_out = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        if let Ok(mut conn) = pool.acquire() {
                            let now = checked_out.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            conn.execute("UPDATE hits SET n = n + 1");
                            checked_out.fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 3);
        let status = pool.status();
        assert!(status.size <= 3);
        assert_eq!(status.in_use, 0);
    }
}
