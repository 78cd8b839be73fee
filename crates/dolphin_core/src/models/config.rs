//! Connection configuration models.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DolphinError;

/// Default MySQL port.
pub const DEFAULT_PORT: u16 = 3306;

/// Default connection character set.
pub const DEFAULT_CHARSET: &str = "utf8mb4";

/// TLS material for the connection.
///
/// Applied by the driver when the `tls` feature is enabled; the core never
/// reads the files itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Request an encrypted connection
    pub enabled: bool,
    /// Client certificate path
    pub certificate: Option<PathBuf>,
    /// Client private key path
    pub key: Option<PathBuf>,
    /// CA certificate path
    pub ca_certificate: Option<PathBuf>,
}

/// Configuration for a database connection.
///
/// Used both by [`ConnectionWrapper`](crate::services::ConnectionWrapper) and
/// [`ConnectionPool`](crate::services::ConnectionPool). The password is never
/// printed by the `Debug` implementation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server hostname or IP
    pub host: String,
    /// Server port (default 3306)
    pub port: u16,
    /// Login username
    pub user: String,
    /// Login password
    pub password: String,
    /// Schema selected after connecting (empty = none)
    pub database: String,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u32,
    /// Socket read timeout in seconds
    pub read_timeout_secs: u32,
    /// Socket write timeout in seconds
    pub write_timeout_secs: u32,
    /// Character set applied with `SET NAMES`
    pub charset: String,
    /// Ask the driver for transparent reconnects. The `mysql` client has no
    /// such option; the wrapper reconnects a dead link once before each
    /// statement either way.
    pub auto_reconnect: bool,
    /// Attempts made by an explicit reconnect
    pub max_retries: u32,
    /// TLS settings
    pub tls: TlsConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: "root".to_string(),
            password: String::new(),
            database: String::new(),
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            charset: DEFAULT_CHARSET.to_string(),
            auto_reconnect: true,
            max_retries: 3,
            tls: TlsConfig::default(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("write_timeout_secs", &self.write_timeout_secs)
            .field("charset", &self.charset)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("max_retries", &self.max_retries)
            .field("tls", &self.tls)
            .finish()
    }
}

impl ConnectionConfig {
    /// Create a configuration for the given server and credentials.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self { host: host.into(), user: user.into(), password: password.into(), ..Self::default() }
    }

    /// Create a builder for complex configurations.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, DolphinError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DolphinError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DolphinError::config(format!("Failed to read '{}': {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), DolphinError> {
        if self.host.is_empty() {
            return Err(DolphinError::config("Host is required"));
        }
        if self.port == 0 {
            return Err(DolphinError::config("Port must be non-zero"));
        }
        if self.charset.is_empty() || !self.charset.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(DolphinError::config(format!("Invalid charset '{}'", self.charset)));
        }
        Ok(())
    }

    /// Get the display connection string (without password).
    pub fn display_url(&self) -> String {
        format!("mysql://{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }

    /// Short `user@host:port/database` description.
    pub fn connection_info(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

/// Builder for ConnectionConfig.
#[derive(Debug, Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = user.into();
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    /// Set the database selected after connecting.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout_secs(mut self, secs: u32) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    /// Set the read timeout.
    pub fn read_timeout_secs(mut self, secs: u32) -> Self {
        self.config.read_timeout_secs = secs;
        self
    }

    /// Set the write timeout.
    pub fn write_timeout_secs(mut self, secs: u32) -> Self {
        self.config.write_timeout_secs = secs;
        self
    }

    /// Set the character set.
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.config.charset = charset.into();
        self
    }

    /// Enable or disable the reconnect-before-statement policy.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Set how many attempts an explicit reconnect makes.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set TLS settings.
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = tls;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ConnectionConfig, DolphinError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_server_conventions() {
        let config = ConnectionConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.charset, "utf8mb4");
        assert!(config.auto_reconnect);
        assert!(!config.tls.enabled);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ConnectionConfig::new("db.internal", "app", "hunter2");
        let printed = format!("{config:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config =
            ConnectionConfig::from_json(r#"{"host": "10.0.0.5", "user": "reporter", "database": "sales"}"#)
                .unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 3306);
        assert_eq!(config.database, "sales");
        assert_eq!(config.read_timeout_secs, 30);
    }

    #[test]
    fn test_from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, r#"{"host": "mysql.local", "port": 3307, "tls": {"enabled": true}}"#)
            .unwrap();

        let config = ConnectionConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 3307);
        assert!(config.tls.enabled);

        let missing = ConnectionConfig::from_file(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(DolphinError::Config { .. })));
    }

    #[test]
    fn test_builder_rejects_bad_charset() {
        let err = ConnectionConfig::builder().charset("utf8; DROP").build().unwrap_err();
        assert!(err.to_string().contains("Invalid charset"));

        let ok = ConnectionConfig::builder().host("h").port(3310).database("d").build().unwrap();
        assert_eq!(ok.connection_info(), "root@h:3310/d");
        assert_eq!(ok.display_url(), "mysql://root@h:3310/d");
    }
}
