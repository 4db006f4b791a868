//! Response strategies, one per [`RequestClass`](crate::classify::RequestClass).
//!
//! | Class        | Strategy                                         |
//! |--------------|--------------------------------------------------|
//! | Navigation   | network first, Shell fallback, Shell refresh     |
//! | Same-origin  | cache first, background revalidation to Runtime  |
//! | Cross-origin | network only, never cached                       |
//!
//! Strategies read and write entries but never create or delete partitions.

pub mod cross_origin;
pub mod navigation;
pub mod same_origin;

use std::sync::Arc;

use crate::background::BackgroundWrites;
use crate::error::Result;
use crate::http::{RequestKey, Response};
use crate::partition::{PartitionKind, Partitions};
use crate::stats::{InterceptStats, Outcome};
use crate::storage::CacheStorage;
use crate::transport::Transport;

/// Everything a strategy needs to answer a request.
#[derive(Clone)]
pub struct StrategyContext {
    /// Partition backend.
    pub storage: Arc<dyn CacheStorage>,
    /// Network below the layer.
    pub transport: Arc<dyn Transport>,
    /// Current generation's partition names.
    pub partitions: Partitions,
    /// Key of the boot document (e.g. `/index.html`).
    pub boot_key: RequestKey,
    /// Key of the application root (`/`).
    pub root_key: RequestKey,
    /// Tracker for writes that outlive the response.
    pub writes: BackgroundWrites,
    /// Outcome counters.
    pub stats: Arc<InterceptStats>,
}

impl StrategyContext {
    /// Stores `response` under `key` in the `kind` partition, waiting for the
    /// write. A failure is logged and counted, never returned.
    pub async fn store(&self, kind: PartitionKind, key: &RequestKey, response: &Response) {
        let name = self.partitions.name(kind);
        if let Err(e) = self.storage.put(name, key, response).await {
            log::warn!("Could not cache {key} in {name}: {e}");
            self.stats.record(Outcome::WriteFailure);
        }
    }

    /// Schedules the same write as [`store`](Self::store) in the background
    /// and returns immediately.
    pub fn store_later(&self, kind: PartitionKind, key: RequestKey, response: Response) {
        let storage = Arc::clone(&self.storage);
        let stats = Arc::clone(&self.stats);
        let name = self.partitions.name(kind).to_string();
        let label = format!("{key} -> {name}");

        self.writes.spawn(label, async move {
            let result = storage.put(&name, &key, &response).await;
            if result.is_err() {
                stats.record(Outcome::WriteFailure);
            }
            result
        });
    }

    /// Runs `write` in the background under `label`; see
    /// [`BackgroundWrites::spawn`].
    pub fn spawn_write<F>(&self, label: String, write: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.writes.spawn(label, write);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport and storage doubles shared by the strategy tests.

    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use reqwest::Url;

    use super::*;
    use crate::error::Error;
    use crate::http::Request;
    use crate::storage::MemoryStorage;

    /// A transport that answers from a per-URL script, or fails.
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<HashMap<String, VecDeque<Response>>>,
        pub calls: Mutex<Vec<Request>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues `response` for the next fetch of `url`.
        pub fn respond(&self, url: &str, response: Response) {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(response);
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn last_call(&self) -> Option<Request> {
            self.calls.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            let url = request.url.to_string();
            self.calls.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .get_mut(&url)
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| Error::Network(format!("{url} unreachable")))
        }
    }

    /// Storage whose writes always fail.
    pub struct ReadOnlyStorage(pub MemoryStorage);

    #[async_trait]
    impl CacheStorage for ReadOnlyStorage {
        async fn open(&self, name: &str) -> Result<()> {
            self.0.open(name).await
        }

        async fn put(&self, _name: &str, _key: &RequestKey, _response: &Response) -> Result<()> {
            Err(Error::Storage("quota exceeded".into()))
        }

        async fn lookup(&self, name: &str, key: &RequestKey) -> Result<Option<Response>> {
            self.0.lookup(name, key).await
        }

        async fn delete(&self, name: &str) -> Result<bool> {
            self.0.delete(name).await
        }

        async fn names(&self) -> Result<Vec<String>> {
            self.0.names().await
        }
    }

    pub const ORIGIN: &str = "https://app.test";

    pub fn url(path: &str) -> Url {
        Url::parse(ORIGIN).unwrap().join(path).unwrap()
    }

    pub fn key(path: &str) -> RequestKey {
        RequestKey::get(url(path))
    }

    /// Builds a context for version `v1` with both partitions open.
    pub async fn context(
        storage: Arc<dyn CacheStorage>,
        transport: Arc<dyn Transport>,
    ) -> StrategyContext {
        let partitions = Partitions::for_version("v1").unwrap();
        storage.open(partitions.shell()).await.unwrap();
        storage.open(partitions.runtime()).await.unwrap();
        StrategyContext {
            storage,
            transport,
            partitions,
            boot_key: key("/index.html"),
            root_key: key("/"),
            writes: BackgroundWrites::new(),
            stats: Arc::new(InterceptStats::new()),
        }
    }
}
