//! Scripted in-memory driver for unit tests.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Connection, Connector, RowSet, PROBE_STATEMENT};
use crate::error::DriverError;
use crate::models::{ConnectionConfig, Row};

#[derive(Default)]
struct MockState {
    next_id: usize,
    connect_attempts: usize,
    refuse_connections: bool,
    /// Connections whose link reports closed.
    closed: HashSet<usize>,
    /// Connections that still report open but fail every statement.
    broken: HashSet<usize>,
    /// Statements run, tagged with the connection id.
    log: Vec<(usize, String)>,
    /// (needle, rows) pairs answered by `query`.
    responses: Vec<(String, RowSet)>,
    /// (needle, error) pairs failing any statement containing the needle.
    failures: Vec<(String, DriverError)>,
    /// Needles whose statement closes the link mid-flight.
    link_killers: Vec<String>,
    affected_rows: u64,
    last_config: Option<ConnectionConfig>,
}

/// Connector whose connections are controlled from the test.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        let connector = Self::default();
        connector.state.lock().affected_rows = 1;
        connector
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    /// Answer queries containing `needle` with the given rows.
    pub fn respond(&self, needle: &str, columns: &[&str], rows: &[&[&str]]) {
        let set = RowSet {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| Row::new(r.iter().map(|f| f.to_string()).collect()))
                .collect(),
        };
        self.state.lock().responses.push((needle.to_string(), set));
    }

    /// Fail statements containing `needle`.
    pub fn fail_on(&self, needle: &str, error: DriverError) {
        self.state.lock().failures.push((needle.to_string(), error));
    }

    /// Close the link while running statements containing `needle`.
    pub fn lose_link_on(&self, needle: &str) {
        self.state.lock().link_killers.push(needle.to_string());
    }

    pub fn set_affected_rows(&self, rows: u64) {
        self.state.lock().affected_rows = rows;
    }

    /// Make a connection report closed.
    pub fn close_link(&self, id: usize) {
        self.state.lock().closed.insert(id);
    }

    /// Make a connection fail statements while still reporting open.
    pub fn break_link(&self, id: usize) {
        self.state.lock().broken.insert(id);
    }

    /// Statements run, excluding probes.
    pub fn statements(&self) -> Vec<String> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|(_, sql)| sql != PROBE_STATEMENT)
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    /// Every statement run, tagged with its connection id.
    pub fn log(&self) -> Vec<(usize, String)> {
        self.state.lock().log.clone()
    }

    pub fn probe_count(&self) -> usize {
        self.state.lock().log.iter().filter(|(_, sql)| sql == PROBE_STATEMENT).count()
    }

    /// Ids of connections that were explicitly closed or killed.
    pub fn closed_ids(&self) -> HashSet<usize> {
        self.state.lock().closed.clone()
    }

    pub fn last_config(&self) -> Option<ConnectionConfig> {
        self.state.lock().last_config.clone()
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    fn connect(&self, config: &ConnectionConfig) -> Result<MockConnection, DriverError> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        state.last_config = Some(config.clone());
        if state.refuse_connections {
            return Err(DriverError::with_details(
                format!("Can't connect to MySQL server on '{}'", config.host),
                2003,
                "HY000",
            ));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.log.push((id, format!("SET NAMES {}", config.charset)));
        Ok(MockConnection { id, state: Arc::clone(&self.state) })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub struct MockConnection {
    pub id: usize,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn run(&mut self, sql: &str) -> Result<Option<RowSet>, DriverError> {
        let mut state = self.state.lock();
        if state.closed.contains(&self.id) {
            return Err(DriverError::with_details("Lost connection to MySQL server", 2013, "HY000"));
        }
        state.log.push((self.id, sql.to_string()));
        if state.link_killers.iter().any(|needle| sql.contains(needle.as_str())) {
            state.closed.insert(self.id);
            return Err(DriverError::with_details("Lost connection to MySQL server during query", 2013, "HY000"));
        }
        if state.broken.contains(&self.id) {
            return Err(DriverError::with_details("MySQL server has gone away", 2006, "HY000"));
        }
        if let Some((_, err)) = state.failures.iter().find(|(needle, _)| sql.contains(needle.as_str()))
        {
            return Err(err.clone());
        }
        Ok(state
            .responses
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, set)| set.clone()))
    }
}

impl Connection for MockConnection {
    fn query(&mut self, sql: &str, max_rows: usize) -> Result<RowSet, DriverError> {
        let mut set = self.run(sql)?.unwrap_or_default();
        if max_rows > 0 {
            set.rows.truncate(max_rows);
        }
        Ok(set)
    }

    fn query_bound(
        &mut self,
        sql: &str,
        params: &[String],
        max_rows: usize,
    ) -> Result<RowSet, DriverError> {
        let tagged = format!("{sql} -- bound {params:?}");
        let mut set = self.run(&tagged)?.unwrap_or_default();
        if max_rows > 0 {
            set.rows.truncate(max_rows);
        }
        Ok(set)
    }

    fn execute(&mut self, sql: &str) -> Result<u64, DriverError> {
        self.run(sql)?;
        Ok(self.state.lock().affected_rows)
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError> {
        let sql = if enabled { "SET autocommit = 1" } else { "SET autocommit = 0" };
        self.run(sql).map(|_| ())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.run("COMMIT").map(|_| ())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.run("ROLLBACK").map(|_| ())
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed.contains(&self.id)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.state.lock().closed.insert(self.id);
        Ok(())
    }
}
