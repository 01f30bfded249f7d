//! Redis-backed key-value store.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::info;

use super::KeyValueStore;
use crate::error::{FloodgateError, Result};

/// Store backed by a shared Redis instance, for multi-instance deployments
/// where counters must be visible across processes.
///
/// Uses `SET ... EX` so expiry is enforced server-side. All errors are
/// wrapped as [`FloodgateError::Store`] with the original error preserved
/// as the source.
#[derive(Clone, Debug)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(FloodgateError::store)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(FloodgateError::store)?;

        info!(url = %url, "Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(FloodgateError::store)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl_seconds)
            .await
            .map_err(FloodgateError::store)?;
        Ok(())
    }
}
