//! Structured logging setup with console and file output.
//!
//! Provides:
//! - Daily rotating log files
//! - Build-type conditional log levels
//! - Console-only fallback when file logging fails
//! - Environment variable override via DOLPHIN_LOG or RUST_LOG
//! - Opt-in tracing of the `mysql` driver, which is kept quiet by default
//!
//! The core only emits `tracing` events. Installing a subscriber is left to the
//! host application, which may use [`init_logging`] or its own setup.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "DOLPHIN_LOG";

/// Targets emitted by the MySQL client crates.
const DRIVER_TARGETS: [&str; 2] = ["mysql", "mysql_common"];

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether running in a PTY (affects output formatting)
    pub is_pty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
    /// Raise the MySQL client crates to `trace` on top of the filter
    pub driver_tracing: bool,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            is_pty: atty::is(atty::Stream::Stdout),
            log_filter: None,
            driver_tracing: false,
        }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Trace the MySQL client's protocol handling.
    pub fn with_driver_tracing(mut self) -> Self {
        self.driver_tracing = true;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let filter = build_env_filter(self.log_filter.as_deref());
        if self.driver_tracing {
            trace_driver_targets(filter)
        } else {
            filter
        }
    }
}

/// Guard that must be held for the lifetime of the application.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Install a global subscriber.
///
/// Interactive terminals get console output only. Otherwise logs go to a daily
/// rolling file in `log_dir` plus the console, falling back to console-only if
/// the file cannot be opened. Does nothing if a subscriber is already set.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    if config.is_pty {
        return init_stdout_logging(config.env_filter());
    }

    match init_file_logging(&config) {
        Ok(guard) => LoggingGuard { _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {e}. Using console only.");
            init_stdout_logging(config.env_filter())
        }
    }
}

/// Initialize with defaults (convenience function).
pub fn init_logging_default() -> LoggingGuard {
    init_logging(LogConfig::new(log_dir()))
}

fn init_stdout_logging(filter: EnvFilter) -> LoggingGuard {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Global subscriber already set, keeping it");
    }

    LoggingGuard { _worker_guard: None }
}

fn init_file_logging(config: &LogConfig) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("dolphin")
        .filename_suffix("log")
        .build(&config.log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Console gets INFO and above, the file gets everything the filter allows
    let stdout = std::io::stdout.with_max_level(tracing::Level::INFO);
    let combined = stdout.and(non_blocking);

    let installed = tracing_subscriber::fmt()
        .with_writer(combined)
        .with_env_filter(config.env_filter())
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Global subscriber already set, keeping it");
    }

    Ok(guard)
}

/// Build the environment filter from config or defaults.
fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    // Priority: custom filter > DOLPHIN_LOG > RUST_LOG > default
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Append `trace` directives for the MySQL client crates.
fn trace_driver_targets(mut filter: EnvFilter) -> EnvFilter {
    for target in DRIVER_TARGETS {
        match format!("{target}=trace").parse::<Directive>() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Warning: Invalid driver directive for {target}: {e}"),
        }
    }
    filter
}

/// Get the default log filter based on build type.
///
/// The MySQL client logs every packet exchange at debug level, so its targets
/// are capped even in debug builds.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,dolphin_core=trace,mysql=info,mysql_common=info"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,dolphin_core=info,mysql=warn,mysql_common=warn"
    }
}

/// Get the application data directory.
///
/// Debug builds use `./dolphin_data` in the current directory.
pub fn default_data_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from("./dolphin_data")
    }

    #[cfg(not(debug_assertions))]
    {
        dirs::data_dir()
            .map(|d| d.join("dolphin"))
            .unwrap_or_else(|| PathBuf::from("./dolphin_data"))
    }
}

/// Get the default log directory.
pub fn log_dir() -> PathBuf {
    default_data_dir().join("logs")
}
