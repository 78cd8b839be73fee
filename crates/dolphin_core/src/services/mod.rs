//! Connection services for the Dolphin data-access core.
//!
//! This module contains the stateful components:
//! - `wrapper` - Single connection with serialized access and reconnect policy
//! - `transaction` - Scoped transaction guard
//! - `pool` - Bounded connection pool with health checks and idle eviction
//! - `schema` - Introspection helpers on the wrapper

pub mod pool;
pub mod schema;
pub mod transaction;
pub mod wrapper;

pub use pool::{ConnectionPool, PooledConnection, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_POOL_SIZE};
pub use transaction::TransactionGuard;
pub use wrapper::{ConnectionWrapper, LogCallback, INJECTION_REJECTED};
