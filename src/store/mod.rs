//! Key-value store abstraction and backends.

mod memory;
mod redis;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Contract for the TTL-expiring key-value store that holds counter records.
///
/// This trait abstracts over the in-memory and Redis backends so the
/// evaluator can work with either. Values are opaque blobs; the store
/// guarantees a key is removed no earlier than `ttl_seconds` after the
/// write, and a `get` after expiry behaves as if the key was never written.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the last value written for `key`, or `None` if absent or
    /// expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write or overwrite `key`, expiring it `ttl_seconds` from now.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()>;
}
