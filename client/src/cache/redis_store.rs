//! Redis-backed result cache.
//!
//! Values are stored as JSON under the hex cache key, with an expiration set
//! on every write.

use super::{CacheError, ResultCache};
use crate::search::SearchResult;
use async_trait::async_trait;
use ig_cache_key::CacheKey;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

/// One week, the expiration the command-line tool has always used.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    expiration: Duration,
}

impl RedisCache {
    /// Connect to `url` (e.g. `redis://127.0.0.1/`).
    ///
    /// # Errors
    /// [`CacheError::Backend`] if the URL is invalid or the server is
    /// unreachable.
    pub async fn connect(url: &str, expiration: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let connection = ConnectionManager::new(client).await.map_err(backend)?;
        tracing::debug!(expiration_secs = expiration.as_secs(), "Connected to redis cache");
        Ok(Self {
            connection,
            expiration,
        })
    }
}

#[async_trait]
impl ResultCache for RedisCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<SearchResult>, CacheError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(key.as_str()).await.map_err(backend)?;
        raw.map(|value| serde_json::from_str(&value))
            .transpose()
            .map_err(CacheError::from)
    }

    async fn set(&self, key: &CacheKey, value: &SearchResult) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        let payload = serde_json::to_string(value)?;
        let () = connection
            .set_ex(key.as_str(), payload, self.expiration.as_secs().max(1))
            .await
            .map_err(backend)?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::needless_pass_by_value)]
fn backend(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}
