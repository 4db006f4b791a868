//! In-process partition storage.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::CacheStorage;
use crate::error::{Error, Result};
use crate::http::{RequestKey, Response};

type Partition = HashMap<RequestKey, Response>;

/// Partition storage held entirely in memory.
///
/// Entries live as long as the value does. Useful when embedding the layer
/// in a process that already has its own persistence, and in tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    partitions: RwLock<HashMap<String, Partition>>,
}

impl MemoryStorage {
    /// Creates an empty storage with no partitions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries in partition `name`, or `None` if it
    /// does not exist.
    #[must_use]
    pub fn len(&self, name: &str) -> Option<usize> {
        self.read().ok()?.get(name).map(HashMap::len)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Partition>>> {
        self.partitions
            .read()
            .map_err(|_| Error::Storage("memory storage lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Partition>>> {
        self.partitions
            .write()
            .map_err(|_| Error::Storage("memory storage lock poisoned".into()))
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.write()?.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
        let mut partitions = self.write()?;
        let partition = partitions
            .get_mut(name)
            .ok_or_else(|| Error::Storage(format!("partition {name} is not open")))?;
        partition.insert(key.clone(), response.clone());
        Ok(())
    }

    async fn lookup(&self, name: &str, key: &RequestKey) -> Result<Option<Response>> {
        Ok(self
            .read()?
            .get(name)
            .and_then(|partition| partition.get(key))
            .cloned())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.write()?.remove(name).is_some())
    }

    async fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
