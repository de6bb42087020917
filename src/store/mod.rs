//! Persistent key-value storage for tokens, settings and tool toggles.
//!
//! Every component receives the store explicitly; there is no ambient global
//! option table. Writes are last-write-wins with no transactional guarantees.

pub mod file;
pub mod memory;
pub mod postgres;
pub mod redis_store;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Abstraction over key-value backends.
/// Implementations: MemoryStore (DashMap), FileStore (JSON file), RedisStore, PgStore.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Read and deserialize `key`, falling back to `T::default()` when absent.
pub async fn load<T>(store: &dyn KvStore, key: &str) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    match store.get(key).await? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(T::default()),
    }
}

pub async fn save<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> anyhow::Result<()> {
    store.set(key, serde_json::to_value(value)?).await
}

/// Open the backend selected by the URL scheme.
pub async fn open(url: &str) -> anyhow::Result<Arc<dyn KvStore>> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| anyhow::anyhow!("store URL '{}' has no scheme", url))?;

    let store: Arc<dyn KvStore> = match scheme {
        "memory" => Arc::new(memory::MemoryStore::new()),
        "file" => Arc::new(file::FileStore::open(rest).await?),
        "redis" | "rediss" => Arc::new(redis_store::RedisStore::connect(url).await?),
        "postgres" | "postgresql" => {
            let pg = postgres::PgStore::connect(url).await?;
            pg.migrate().await?;
            Arc::new(pg)
        }
        other => anyhow::bail!("unsupported store scheme '{}'", other),
    };

    tracing::info!(backend = scheme, "key-value store ready");
    Ok(store)
}
