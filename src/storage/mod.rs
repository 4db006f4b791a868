//! Durable partition storage.
//!
//! The interception layer only ever needs five operations from its cache
//! backend, captured by [`CacheStorage`]. Two implementations are provided:
//! [`MemoryStorage`] for embedding and tests, and [`DiskStorage`] which
//! persists entries under a directory.

mod disk;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use crate::http::{RequestKey, Response};
use crate::partition::Partitions;

/// Abstraction over a named, durable key → response store.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens the partition `name`, creating it if it does not exist.
    async fn open(&self, name: &str) -> Result<()>;

    /// Stores `response` under `key` in partition `name`, replacing any
    /// previous entry. The partition must already exist.
    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()>;

    /// Looks up `key` in partition `name`. A missing partition is a miss.
    async fn lookup(&self, name: &str, key: &RequestKey) -> Result<Option<Response>>;

    /// Deletes partition `name`. Returns `false` if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Lists the names of all existing partitions.
    async fn names(&self) -> Result<Vec<String>>;
}

/// Builds the backend selected by `config`.
#[must_use]
pub fn from_config(config: &StorageConfig) -> Arc<dyn CacheStorage> {
    match config.backend {
        StorageBackend::Disk => {
            log::debug!("Using disk storage at {}", config.dir.display());
            Arc::new(DiskStorage::new(&config.dir))
        }
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
    }
}

/// Searches the current generation's partitions, Shell first then Runtime.
///
/// Partitions from other generations are never consulted. A read error on
/// one partition is logged and treated as a miss for that partition.
pub async fn lookup_any(
    storage: &dyn CacheStorage,
    partitions: &Partitions,
    key: &RequestKey,
) -> Option<Response> {
    for name in partitions.lookup_order() {
        match storage.lookup(name, key).await {
            Ok(Some(response)) => {
                log::debug!("Cache hit for {key} in {name}");
                return Some(response);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Cache read of {key} from {name} failed: {e}"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(Url::parse("https://app.test/").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn lookup_any_prefers_shell() {
        let storage = MemoryStorage::new();
        let p = Partitions::for_version("v1").unwrap();
        storage.open(p.shell()).await.unwrap();
        storage.open(p.runtime()).await.unwrap();
        storage
            .put(p.runtime(), &key("/a"), &Response::ok("runtime"))
            .await
            .unwrap();
        storage
            .put(p.shell(), &key("/a"), &Response::ok("shell"))
            .await
            .unwrap();

        let hit = lookup_any(&storage, &p, &key("/a")).await.unwrap();
        assert_eq!(hit.body, "shell");
    }

    #[tokio::test]
    async fn from_config_selects_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Disk,
            dir: dir.path().to_path_buf(),
        };
        let storage = from_config(&config);
        storage.open("shell-v1").await.unwrap();
        assert!(dir.path().join("shell-v1").is_dir());

        let memory = from_config(&StorageConfig {
            backend: StorageBackend::Memory,
            ..config
        });
        assert!(memory.names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lookup_any_ignores_other_generations() {
        let storage = MemoryStorage::new();
        let old = Partitions::for_version("v1").unwrap();
        let current = Partitions::for_version("v2").unwrap();
        storage.open(old.runtime()).await.unwrap();
        storage
            .put(old.runtime(), &key("/a"), &Response::ok("old"))
            .await
            .unwrap();

        assert!(lookup_any(&storage, &current, &key("/a")).await.is_none());
    }
}
