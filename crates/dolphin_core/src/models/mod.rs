//! Data models for the Dolphin data-access core.
//!
//! This module contains all core data structures:
//! - `config` - ConnectionConfig, TlsConfig
//! - `result` - Row, QueryResult, typed field conversion
//! - `stats` - QueryStatistics, StatisticsSnapshot
//! - `pool` - PoolStatus
//! - `schema` - Typed introspection rows

pub mod config;
pub mod pool;
pub mod result;
pub mod schema;
pub mod stats;

pub use config::{ConnectionConfig, ConnectionConfigBuilder, TlsConfig, DEFAULT_CHARSET, DEFAULT_PORT};
pub use pool::PoolStatus;
pub use result::{FromField, QueryResult, Row, NULL_SENTINEL};
pub use schema::{ColumnDetail, IndexDetail};
pub use stats::{QueryStatistics, StatisticsSnapshot};
