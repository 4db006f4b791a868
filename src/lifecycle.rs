//! Generation lifecycle: install, activate, and client takeover.
//!
//! One [`Lifecycle`] exists per version. It is the only component that
//! creates or deletes partitions. Neither phase ever fails from the host's
//! point of view: every storage or network error is logged, counted in the
//! returned report, and otherwise discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use reqwest::Url;

use crate::background::BackgroundWrites;
use crate::config::LayerConfig;
use crate::error::{Error, Result};
use crate::http::{Request, RequestKey};
use crate::interceptor::Interceptor;
use crate::partition::Partitions;
use crate::stats::InterceptStats;
use crate::storage::CacheStorage;
use crate::strategy::StrategyContext;
use crate::transport::Transport;

/// How many Shell assets are fetched at once during install.
const INSTALL_CONCURRENCY: usize = 4;

/// Host hook for taking over documents opened under a previous generation.
#[async_trait]
pub trait ClientControl: Send + Sync {
    /// Makes `version` the controller of every open client. Returns how many
    /// clients were taken over.
    async fn claim(&self, version: &str) -> Result<usize>;
}

/// A host with no notion of open clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClients;

#[async_trait]
impl ClientControl for NoClients {
    async fn claim(&self, _version: &str) -> Result<usize> {
        Ok(0)
    }
}

/// Clients remembered by a [`ClientRegistry`] before the least recently seen
/// one is forgotten.
pub const DEFAULT_CLIENT_LIMIT: usize = 1024;

#[derive(Debug)]
struct ClientEntry {
    controller: Option<String>,
    last_seen: Instant,
}

/// Tracks which generation controls each connected client.
///
/// Shared across generations so a newly activated one can claim clients the
/// previous one was serving. At most `limit` clients are kept; registering
/// one more evicts the client seen least recently.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, ClientEntry>>,
    active: Mutex<Option<String>>,
    limit: usize,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::with_limit(DEFAULT_CLIENT_LIMIT)
    }
}

impl ClientRegistry {
    /// Creates an empty registry holding up to [`DEFAULT_CLIENT_LIMIT`] clients.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry holding up to `limit` clients (at least one).
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
            limit: limit.max(1),
        }
    }

    /// Records a client, or refreshes it if already known. New clients are
    /// controlled by the active generation, if there is one.
    pub fn register(&self, client_id: &str) {
        let active = self.active_version();
        let Ok(mut clients) = self.clients.lock() else {
            return;
        };
        let now = Instant::now();
        if let Some(entry) = clients.get_mut(client_id) {
            entry.last_seen = now;
            return;
        }
        if clients.len() >= self.limit {
            let oldest = clients
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                log::debug!("Forgetting client {oldest}");
                clients.remove(&oldest);
            }
        }
        clients.insert(
            client_id.to_string(),
            ClientEntry {
                controller: active,
                last_seen: now,
            },
        );
    }

    /// Returns the generation controlling `client_id`, if any.
    #[must_use]
    pub fn controller(&self, client_id: &str) -> Option<String> {
        self.clients
            .lock()
            .ok()?
            .get(client_id)
            .and_then(|entry| entry.controller.clone())
    }

    /// Returns the most recently claimed generation.
    #[must_use]
    pub fn active_version(&self) -> Option<String> {
        self.active.lock().ok()?.clone()
    }

    /// Number of known clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.lock().map_or(0, |clients| clients.len())
    }

    /// Returns true if no client has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ClientControl for ClientRegistry {
    async fn claim(&self, version: &str) -> Result<usize> {
        let poisoned = || Error::Storage("client registry lock poisoned".into());
        *self.active.lock().map_err(|_| poisoned())? = Some(version.to_string());

        let mut clients = self.clients.lock().map_err(|_| poisoned())?;
        let mut claimed = 0;
        for entry in clients.values_mut() {
            if entry.controller.as_deref() != Some(version) {
                entry.controller = Some(version.to_string());
                claimed += 1;
            }
        }
        Ok(claimed)
    }
}

/// Lifecycle phase of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, nothing written yet.
    Parsed,
    /// Shell populated (best effort).
    Installed,
    /// Stale partitions removed and clients claimed; serving.
    Activated,
}

/// Outcome of [`Lifecycle::install`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Assets written to the Shell.
    pub stored: Vec<String>,
    /// Assets that could not be fetched or written.
    pub failed: Vec<String>,
    /// Whether this generation should replace the active one immediately.
    pub skip_waiting: bool,
}

impl InstallReport {
    /// Returns true if every asset made it into the Shell.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of [`Lifecycle::activate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Stale partitions deleted.
    pub deleted: Vec<String>,
    /// Stale partitions that could not be deleted, or 1 if enumeration
    /// itself failed.
    pub cleanup_failures: usize,
    /// Clients taken over from earlier generations.
    pub claimed: usize,
}

/// Install/activate manager for one version.
pub struct Lifecycle {
    config: LayerConfig,
    origin: Url,
    partitions: Partitions,
    storage: Arc<dyn CacheStorage>,
    transport: Arc<dyn Transport>,
    clients: Arc<dyn ClientControl>,
    phase: Phase,
}

impl Lifecycle {
    /// Creates the lifecycle for `config.version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: LayerConfig,
        storage: Arc<dyn CacheStorage>,
        transport: Arc<dyn Transport>,
        clients: Arc<dyn ClientControl>,
    ) -> Result<Self> {
        config.validate()?;
        let origin = config.origin_url()?;
        let partitions = Partitions::for_version(&config.version)?;
        Ok(Self {
            config,
            origin,
            partitions,
            storage,
            transport,
            clients,
            phase: Phase::Parsed,
        })
    }

    /// Returns this generation's partition names.
    #[must_use]
    pub const fn partitions(&self) -> &Partitions {
        &self.partitions
    }

    /// Returns the version.
    #[must_use]
    pub fn version(&self) -> &str {
        self.partitions.version()
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the layer configuration.
    #[must_use]
    pub const fn config(&self) -> &LayerConfig {
        &self.config
    }

    /// Opens the Shell and writes every Shell asset into it.
    ///
    /// Failures are logged and reported, never returned: the generation is
    /// installable even if it cannot yet work offline. Running install twice
    /// overwrites the same keys.
    pub async fn install(&mut self) -> InstallReport {
        log::info!("Installing generation {}", self.version());
        let mut report = InstallReport {
            skip_waiting: true,
            ..InstallReport::default()
        };

        let assets = match self.config.shell_asset_urls() {
            Ok(assets) => assets,
            Err(e) => {
                log::warn!("Shell asset set is invalid: {e}");
                report.failed.clone_from(&self.config.shell_assets);
                self.phase = Phase::Installed;
                return report;
            }
        };

        let shell = self.partitions.shell();
        if let Err(e) = self.storage.open(shell).await {
            log::warn!("Could not open {shell}: {e}");
            report.failed = assets.into_iter().map(String::from).collect();
            self.phase = Phase::Installed;
            return report;
        }

        let this = &*self;
        let results: Vec<_> = stream::iter(assets)
            .map(|url| async move {
                let result = this.cache_asset(&url).await;
                (url, result)
            })
            .buffer_unordered(INSTALL_CONCURRENCY)
            .collect()
            .await;

        for (url, result) in results {
            match result {
                Ok(()) => report.stored.push(url.into()),
                Err(e) => {
                    log::warn!("Could not cache shell asset {url}: {e}");
                    report.failed.push(url.into());
                }
            }
        }
        report.stored.sort();
        report.failed.sort();

        log::info!(
            "Installed {}: {} shell assets cached, {} failed",
            self.version(),
            report.stored.len(),
            report.failed.len()
        );
        self.phase = Phase::Installed;
        report
    }

    async fn cache_asset(&self, url: &Url) -> Result<()> {
        let response = self.transport.fetch(&Request::get(url.clone())).await?;
        if !response.is_success() {
            return Err(Error::Network(format!("{url} returned {}", response.status)));
        }
        self.storage
            .put(self.partitions.shell(), &RequestKey::get(url.clone()), &response)
            .await
    }

    /// Deletes partitions of other generations, ensures this generation's
    /// partitions exist, and claims open clients.
    ///
    /// Cleanup errors are logged and counted; clients are claimed whether or
    /// not cleanup succeeded.
    pub async fn activate(&mut self) -> ActivationReport {
        if self.phase == Phase::Parsed {
            log::warn!("Activating {} before install", self.version());
        }
        let mut report = ActivationReport::default();

        match self.storage.names().await {
            Ok(names) => {
                for name in names.into_iter().filter(|n| self.partitions.is_stale(n)) {
                    match self.storage.delete(&name).await {
                        Ok(true) => {
                            log::info!("Deleted stale partition {name}");
                            report.deleted.push(name);
                        }
                        Ok(false) => {}
                        Err(e) => {
                            log::warn!("Could not delete stale partition {name}: {e}");
                            report.cleanup_failures += 1;
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("Could not list partitions, skipping cleanup: {e}");
                report.cleanup_failures += 1;
            }
        }

        for name in self.partitions.lookup_order() {
            if let Err(e) = self.storage.open(name).await {
                log::warn!("Could not open {name}: {e}");
            }
        }

        match self.clients.claim(self.partitions.version()).await {
            Ok(claimed) => report.claimed = claimed,
            Err(e) => log::warn!("Could not claim clients: {e}"),
        }

        log::info!(
            "Activated {}: {} stale partitions deleted, {} clients claimed",
            self.version(),
            report.deleted.len(),
            report.claimed
        );
        self.phase = Phase::Activated;
        report
    }

    /// Builds the request interceptor for this generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the boot document or root path cannot be resolved.
    pub fn interceptor(&self) -> Result<Interceptor> {
        let ctx = StrategyContext {
            storage: Arc::clone(&self.storage),
            transport: Arc::clone(&self.transport),
            partitions: self.partitions.clone(),
            boot_key: RequestKey::get(self.config.resolve(&self.config.boot_document)?),
            root_key: RequestKey::get(self.config.resolve(&self.config.root)?),
            writes: BackgroundWrites::new(),
            stats: Arc::new(InterceptStats::new()),
        };
        Ok(Interceptor::new(self.origin.clone(), ctx))
    }
}
