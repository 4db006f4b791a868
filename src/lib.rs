//! offline-shell - An offline-first request interception layer.
//!
//! Every intercepted GET is classified as a navigation, a same-origin
//! resource, or a cross-origin resource, and answered by the matching
//! strategy: network-first with a cached boot document for navigations,
//! stale-while-revalidate for the application's own resources, and plain
//! network pass-through for everything else. Cached entries live in two
//! partitions per deployment version, which are pre-populated on install and
//! garbage-collected on the next version's activation.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use offline_shell::{HttpTransport, LayerConfig, Lifecycle, MemoryStorage, NoClients, Request};
//!
//! # async fn example() -> offline_shell::Result<()> {
//! let config = LayerConfig::new()
//!     .with_version("v1")
//!     .with_origin("https://app.example");
//! let transport = Arc::new(HttpTransport::new(config.timeouts())?);
//!
//! let mut lifecycle = Lifecycle::new(
//!     config,
//!     Arc::new(MemoryStorage::new()),
//!     transport,
//!     Arc::new(NoClients),
//! )?;
//! lifecycle.install().await;
//! lifecycle.activate().await;
//!
//! let interceptor = lifecycle.interceptor()?;
//! let request = Request::parse_get("https://app.example/app.js")?;
//! if let Some(response) = interceptor.handle(&request).await {
//!     println!("{} ({} bytes)", response.status, response.body.len());
//! }
//! interceptor.settle().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod background;
pub mod classify;
pub mod config;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod lifecycle;
pub mod partition;
#[cfg(feature = "server")]
pub mod server;
pub mod stats;
pub mod storage;
pub mod strategy;
pub mod transport;

// Re-export main types for convenience
pub use classify::{RequestClass, classify};
pub use config::{AppConfig, LayerConfig, ServerConfig, StorageBackend, StorageConfig};
pub use error::{Error, Result};
pub use http::{Request, RequestKey, RequestMode, Response};
pub use interceptor::Interceptor;
pub use lifecycle::{
    ActivationReport, ClientControl, ClientRegistry, InstallReport, Lifecycle, NoClients, Phase,
};
pub use partition::{PartitionKind, Partitions};
pub use stats::{InterceptStats, Outcome, StatsSnapshot};
pub use storage::{CacheStorage, DiskStorage, MemoryStorage};
pub use transport::{HttpTransport, Transport, TransportTimeouts};
