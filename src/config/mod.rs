//! Configuration for the interception layer and its hosts.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! [layer]
//! version = "v7"
//! origin = "https://app.example"
//! boot_document = "/index.html"
//! shell_assets = ["/", "/index.html"]
//!
//! [storage]
//! backend = "disk"
//! dir = "/var/cache/offline-shell"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 9780
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::partition::Partitions;
use crate::transport::TransportTimeouts;

/// Environment variable overriding [`LayerConfig::version`].
pub const VERSION_ENV: &str = "OFFSH_VERSION";

/// Settings of one generation of the interception layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Deployment generation; bump to invalidate every cached partition.
    pub version: String,
    /// The application's own origin. Requests elsewhere are cross-origin.
    pub origin: String,
    /// Path of the boot document served to offline navigations.
    pub boot_document: String,
    /// Path of the application root, the second offline fallback.
    pub root: String,
    /// Paths pre-populated into the Shell at install.
    pub shell_assets: Vec<String>,
    /// Network connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Whole-request network timeout in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            origin: "http://127.0.0.1:8080".to_string(),
            boot_document: "/index.html".to_string(),
            root: "/".to_string(),
            shell_assets: vec!["/".to_string(), "/index.html".to_string()],
            connect_timeout_secs: None,
            request_timeout_secs: None,
        }
    }
}

impl LayerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the application origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets the boot document path.
    #[must_use]
    pub fn with_boot_document(mut self, path: impl Into<String>) -> Self {
        self.boot_document = path.into();
        self
    }

    /// Replaces the Shell asset set.
    #[must_use]
    pub fn with_shell_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Sets both network timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, connect_secs: Option<u64>, request_secs: Option<u64>) -> Self {
        self.connect_timeout_secs = connect_secs;
        self.request_timeout_secs = request_secs;
        self
    }

    /// Parses the configured origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the origin is not an absolute
    /// http(s) URL.
    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin).map_err(|e| Error::InvalidUrl {
            url: self.origin.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl {
                url: self.origin.clone(),
                reason: "origin must use http or https".to_string(),
            });
        }
        Ok(url)
    }

    /// Resolves `path` against the origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the origin or the path is invalid.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin_url()?.join(path).map_err(|e| Error::InvalidUrl {
            url: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Resolves every Shell asset against the origin, in order, dropping
    /// duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] for the first asset that cannot be
    /// resolved.
    pub fn shell_asset_urls(&self) -> Result<Vec<Url>> {
        let mut urls: Vec<Url> = Vec::with_capacity(self.shell_assets.len());
        for asset in &self.shell_assets {
            let url = self.resolve(asset)?;
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(urls)
    }

    /// Network timeouts for the transport.
    #[must_use]
    pub fn timeouts(&self) -> TransportTimeouts {
        TransportTimeouts {
            connect: self.connect_timeout_secs.map(Duration::from_secs),
            request: self.request_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Checks that the version, origin, and asset paths are usable.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        Partitions::for_version(&self.version)?;
        self.resolve(&self.boot_document)?;
        self.resolve(&self.root)?;
        self.shell_asset_urls()?;
        if !self.shell_assets.iter().any(|a| a == &self.boot_document) {
            log::warn!(
                "Boot document {} is not in the shell asset set; offline navigation relies on a prior online visit",
                self.boot_document
            );
        }
        Ok(())
    }
}

/// Which [`CacheStorage`](crate::storage::CacheStorage) backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// [`DiskStorage`](crate::storage::DiskStorage) under [`StorageConfig::dir`].
    #[default]
    Disk,
    /// [`MemoryStorage`](crate::storage::MemoryStorage); lost on exit.
    Memory,
}

/// Partition storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind.
    pub backend: StorageBackend,
    /// Root directory for the disk backend.
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            backend: StorageBackend::Disk,
            dir: cache_dir.join("offline-shell"),
        }
    }
}

/// Local HTTP front settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9780,
        }
    }
}

/// Complete configuration combining layer, storage, and server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Interception layer settings.
    pub layer: LayerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Server settings.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location: `{config_dir}/offline-shell/offsh.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("offline-shell")
            .join("offsh.toml")
    }

    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads configuration.
    ///
    /// With an explicit `path` the file must exist. Without one, the default
    /// path is used if present, otherwise built-in defaults. The
    /// [`VERSION_ENV`] variable then overrides the version, and the result is
    /// validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => {
                let default = Self::default_path();
                if default.is_file() {
                    log::debug!("Loading config from {}", default.display());
                    Self::from_toml(&std::fs::read_to_string(&default)?)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(version) = std::env::var(VERSION_ENV) {
            log::info!("Version overridden by {VERSION_ENV}: {version}");
            config.layer.version = version;
        }

        config.layer.validate()?;
        Ok(config)
    }

    /// Serializes this config to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }
}
