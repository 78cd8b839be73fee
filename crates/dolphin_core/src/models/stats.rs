//! Running query statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// Statements executed
    pub total: u64,
    /// Statements that succeeded
    pub successful: u64,
    /// Statements that failed
    pub failed: u64,
    /// When the last statement finished
    pub last_query_at: Option<DateTime<Utc>>,
}

/// Counters updated once per executed statement.
///
/// The counters are atomics and may be read while a statement is running.
#[derive(Debug, Default)]
pub struct QueryStatistics {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    last_query_at: Mutex<Option<DateTime<Utc>>>,
}

impl QueryStatistics {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one statement outcome.
    pub fn record(&self, success: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        *self.last_query_at.lock() = Some(Utc::now());
    }

    /// Copy the current counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_query_at: *self.last_query_at.lock(),
        }
    }

    /// Zero the counters.
    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.successful.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        *self.last_query_at.lock() = None;
    }
}
