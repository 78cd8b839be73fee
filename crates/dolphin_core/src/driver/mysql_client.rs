//! MySQL backend built on the synchronous `mysql` crate.

use std::time::Duration;

use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Value};

use super::{Connection, Connector, RowSet};
use crate::error::DriverError;
#[cfg(feature = "tls")]
use crate::models::TlsConfig;
use crate::models::{ConnectionConfig, Row, NULL_SENTINEL};

/// Opens connections with the `mysql` client.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }

    /// Translate a configuration into driver options.
    fn options(config: &ConnectionConfig) -> OptsBuilder {
        let mut builder = OptsBuilder::new()
            .ip_or_hostname(Some(config.host.clone()))
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .tcp_connect_timeout(timeout(config.connect_timeout_secs))
            .read_timeout(timeout(config.read_timeout_secs))
            .write_timeout(timeout(config.write_timeout_secs))
            .init(vec![format!("SET NAMES {}", config.charset)]);

        if !config.database.is_empty() {
            builder = builder.db_name(Some(config.database.clone()));
        }

        if config.tls.enabled {
            builder = apply_tls(builder, config);
        }

        builder
    }
}

#[cfg(feature = "tls")]
fn apply_tls(builder: OptsBuilder, config: &ConnectionConfig) -> OptsBuilder {
    builder.ssl_opts(Some(ssl_opts(&config.tls)))
}

/// CA certificate and client identity from the config.
///
/// The client identity needs both the certificate chain and the private key.
#[cfg(feature = "tls")]
fn ssl_opts(tls: &TlsConfig) -> mysql::SslOpts {
    let opts = mysql::SslOpts::default().with_root_cert_path(tls.ca_certificate.clone());
    match (&tls.certificate, &tls.key) {
        (Some(certificate), Some(key)) => opts.with_client_identity(Some(
            mysql::ClientIdentity::new(certificate.clone(), key.clone()),
        )),
        (None, None) => opts,
        _ => {
            tracing::warn!("Client certificate and key must be set together, skipping client identity");
            opts
        }
    }
}

#[cfg(not(feature = "tls"))]
fn apply_tls(builder: OptsBuilder, config: &ConnectionConfig) -> OptsBuilder {
    tracing::warn!(host = %config.host, "TLS requested but the `tls` feature is disabled");
    builder
}

/// Zero means "no timeout".
fn timeout(secs: u32) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(u64::from(secs)))
}

impl Connector for MySqlConnector {
    type Connection = MySqlConnection;

    fn connect(&self, config: &ConnectionConfig) -> Result<MySqlConnection, DriverError> {
        let conn = Conn::new(Self::options(config))?;
        tracing::debug!(host = %config.host, port = config.port, "MySQL connection opened");
        Ok(MySqlConnection { conn: Some(conn) })
    }

    fn name(&self) -> &'static str {
        "mysql"
    }
}

/// A live `mysql` connection.
///
/// The inner handle is dropped (sending COM_QUIT) on close, and also after an
/// I/O failure so that `is_closed` reports the broken link.
pub struct MySqlConnection {
    conn: Option<Conn>,
}

impl MySqlConnection {
    fn with_conn<T>(
        &mut self,
        op: impl FnOnce(&mut Conn) -> Result<T, mysql::Error>,
    ) -> Result<T, DriverError> {
        let conn = self.conn.as_mut().ok_or_else(|| DriverError::new("Connection is closed"))?;
        match op(conn) {
            Ok(value) => Ok(value),
            Err(err) => {
                if matches!(err, mysql::Error::IoError(_)) {
                    tracing::warn!(error = %err, "MySQL link broken, marking connection closed");
                    self.conn = None;
                }
                Err(err.into())
            }
        }
    }
}

impl Connection for MySqlConnection {
    fn query(&mut self, sql: &str, max_rows: usize) -> Result<RowSet, DriverError> {
        self.with_conn(|conn| {
            let mut result = conn.query_iter(sql)?;
            let columns = column_names(result.columns().as_ref());
            collect_rows(columns, &mut result, max_rows)
        })
    }

    fn query_bound(
        &mut self,
        sql: &str,
        params: &[String],
        max_rows: usize,
    ) -> Result<RowSet, DriverError> {
        let values: Vec<Value> = params.iter().map(|p| Value::from(p.as_str())).collect();
        self.with_conn(|conn| {
            let mut result = conn.exec_iter(sql, values)?;
            let columns = column_names(result.columns().as_ref());
            collect_rows(columns, &mut result, max_rows)
        })
    }

    fn execute(&mut self, sql: &str) -> Result<u64, DriverError> {
        self.with_conn(|conn| {
            conn.query_drop(sql)?;
            Ok(conn.affected_rows())
        })
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError> {
        let sql = if enabled { "SET autocommit = 1" } else { "SET autocommit = 0" };
        self.with_conn(|conn| conn.query_drop(sql))
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.with_conn(|conn| conn.query_drop("COMMIT"))
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.with_conn(|conn| conn.query_drop("ROLLBACK"))
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.conn.take();
        Ok(())
    }
}

fn column_names(columns: &[mysql::Column]) -> Vec<String> {
    columns.iter().map(|c| c.name_str().into_owned()).collect()
}

fn collect_rows(
    columns: Vec<String>,
    rows: impl Iterator<Item = Result<mysql::Row, mysql::Error>>,
    max_rows: usize,
) -> Result<RowSet, mysql::Error> {
    let mut kept = Vec::new();
    for row in rows {
        let row = row?;
        // Keep draining past the cap so the result set is fully consumed.
        if max_rows > 0 && kept.len() >= max_rows {
            continue;
        }
        let fields = (0..row.len())
            .map(|i| row.as_ref(i).map(value_to_text).unwrap_or_else(|| NULL_SENTINEL.to_string()))
            .collect();
        kept.push(Row::new(fields));
    }
    Ok(RowSet { columns, rows: kept })
}

/// Render a driver value the way the text protocol would.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::NULL => NULL_SENTINEL.to_string(),
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let mut text =
                format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}");
            if *micros > 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            text
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = days * 24 + u32::from(*hours);
            let sign = if *negative { "-" } else { "" };
            let mut text = format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}");
            if *micros > 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            text
        }
    }
}
