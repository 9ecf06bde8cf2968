//! Key-value store abstraction shared by the session repository and the
//! idempotency guard.
//!
//! Three operations, string keys and values, optional TTL. `set_nx` must be
//! atomic at the backend; the single-flight guarantee of the idempotency
//! layer rests on it. The in-memory store is for tests and single-node
//! development; production deployments point `KV_CONNECTION_STRING` at a
//! Redis-class system.

mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

use std::{env, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
#[cfg(not(feature = "redis-store"))]
use tracing::warn;

pub use memory::MemoryKvStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisKvStore;

/// Shared store handle used across services.
pub type SharedKvStore = Arc<dyn KvStore>;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Unconditional write; a TTL here replaces any prior TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Atomic create-if-absent. Returns whether the caller won the race.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
}

/// Returns an in-memory store wrapped in an [`Arc`].
pub fn shared_memory_store() -> SharedKvStore {
    Arc::new(MemoryKvStore::new())
}

/// Builds a store from `KV_CONNECTION_STRING`.
///
/// With the `redis-store` feature enabled a Redis-backed store is created;
/// otherwise the function warns and falls back to the in-memory
/// implementation.
pub async fn store_from_env() -> Result<SharedKvStore> {
    match env::var("KV_CONNECTION_STRING") {
        Ok(url) if !url.trim().is_empty() => build_redis_store(url.trim()).await,
        _ => Ok(shared_memory_store()),
    }
}

#[cfg(feature = "redis-store")]
async fn build_redis_store(url: &str) -> Result<SharedKvStore> {
    let store = RedisKvStore::connect(url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-store"))]
async fn build_redis_store(url: &str) -> Result<SharedKvStore> {
    warn!(
        url = %url,
        "KV_CONNECTION_STRING provided but redis-store feature disabled; using in-memory store"
    );
    Ok(shared_memory_store())
}
