//! Connection pool status model.

use serde::{Deserialize, Serialize};

/// Connection pool status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Maximum pool capacity
    pub max_size: usize,
    /// Occupied slots (idle + checked out)
    pub size: usize,
    /// Idle connections ready for reuse
    pub idle: usize,
    /// Connections currently checked out
    pub in_use: usize,
}

impl PoolStatus {
    /// Check if another connection can be handed out.
    pub fn has_capacity(&self) -> bool {
        self.idle > 0 || self.size < self.max_size
    }

    /// Get pool utilization as a percentage.
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            (self.in_use as f64 / self.max_size as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes() {
        let status = PoolStatus { max_size: 10, size: 3, idle: 1, in_use: 2 };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["in_use"], 2);
        assert_eq!(json["max_size"], 10);
    }

    #[test]
    fn test_utilization_and_capacity() {
        let status = PoolStatus { max_size: 4, size: 4, idle: 0, in_use: 4 };
        assert!(!status.has_capacity());
        assert_eq!(status.utilization(), 100.0);

        let empty = PoolStatus { max_size: 0, size: 0, idle: 0, in_use: 0 };
        assert_eq!(empty.utilization(), 0.0);
    }
}
