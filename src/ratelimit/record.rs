//! Persisted counter record and the per-request decision payload.

use serde::{Deserialize, Serialize};

use crate::error::{FloodgateError, Result};

/// The counter record persisted in the key-value store, one per
/// (client, route) pair.
///
/// A record only exists while its window is alive: it is created on the
/// first request of a window, incremented or replaced on later requests,
/// and removed by store TTL expiry or by being overwritten with a fresh
/// window. There is no explicit delete path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    /// Instant the current window began, as milliseconds since the epoch
    pub window_start_ms: i64,
    /// Requests observed inside the window, including the one that
    /// created or last incremented the record (always >= 1)
    pub request_count: u32,
}

impl CounterRecord {
    /// Start a fresh window with this request as its first member.
    pub fn new(now_ms: i64) -> Self {
        Self {
            window_start_ms: now_ms,
            request_count: 1,
        }
    }

    /// The same window with one more request counted.
    pub fn incremented(&self) -> Self {
        Self {
            window_start_ms: self.window_start_ms,
            request_count: self.request_count + 1,
        }
    }

    /// Encode for storage. The store only ever sees an opaque blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(FloodgateError::store)
    }

    /// Decode a stored blob. Returns `None` for unreadable data, which the
    /// evaluator treats the same as an absent record.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

/// The outcome of evaluating one request against its route quota.
///
/// Ephemeral, never persisted. `current` includes the request being
/// evaluated when it was admitted; on a rejection it is the stored count,
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is over quota and should be rejected
    pub limited: bool,
    /// The configured request budget for the matched route
    pub limit: u32,
    /// Requests counted so far in the active window
    pub current: u32,
    /// Time remaining in the active window, rounded up to whole seconds
    pub seconds_until_reset: u64,
}
