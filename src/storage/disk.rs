//! Partition storage persisted under a directory.
//!
//! Layout: `{root}/{partition}/{sha256(key)}.json`. Each entry file holds the
//! key, status, headers and base64 body of one response. Writes go to a
//! temporary file first and are renamed into place, so a reader never sees a
//! half-written entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::CacheStorage;
use crate::error::{Error, Result};
use crate::http::{RequestKey, Response};

/// On-disk form of one cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    method: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    stored_at: DateTime<Utc>,
}

impl StoredEntry {
    fn new(key: &RequestKey, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            method: key.method().to_string(),
            url: key.url().to_string(),
            status: response.status.as_u16(),
            headers,
            body: BASE64.encode(&response.body),
            stored_at: Utc::now(),
        }
    }

    fn into_response(self) -> Result<Response> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| Error::Storage(format!("entry for {} has bad status: {e}", self.url)))?;
        let body = BASE64
            .decode(self.body.as_bytes())
            .map_err(|e| Error::Storage(format!("entry for {} has bad body: {e}", self.url)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.append(name, value);
            }
        }

        Ok(Response {
            status,
            headers,
            body: body.into(),
        })
    }
}

/// Partition storage backed by the local file system.
#[derive(Debug)]
pub struct DiskStorage {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl DiskStorage {
    /// Creates a storage rooted at `root`. The directory is created lazily
    /// on the first [`open`](CacheStorage::open).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Temporary sibling of `path`, unique across processes sharing the root.
    fn tmp_path(&self, path: &Path) -> PathBuf {
        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        path.with_extension(format!("json.{}.{seq}.tmp", std::process::id()))
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> Result<PathBuf> {
        Ok(self
            .partition_dir(name)?
            .join(format!("{}.json", key_digest(key))))
    }
}

/// Hex SHA-256 of the key's display form.
fn key_digest(key: &RequestKey) -> String {
    let digest = Sha256::digest(key.to_string().as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// A name is one path component: no separators, and no leading dot so it
/// can never be `.`, `..` or hidden.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(Error::Storage(format!("invalid partition name {name:?}")));
    }
    Ok(())
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.partition_dir(name)?).await?;
        Ok(())
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
        let dir = self.partition_dir(name)?;
        if !tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()) {
            return Err(Error::Storage(format!("partition {name} is not open")));
        }

        let path = self.entry_path(name, key)?;
        let tmp_path = self.tmp_path(&path);

        let json = serde_json::to_vec(&StoredEntry::new(key, response))?;
        tokio::fs::write(&tmp_path, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn lookup(&self, name: &str, key: &RequestKey) -> Result<Option<Response>> {
        let path = self.entry_path(name, key)?;
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: StoredEntry = serde_json::from_slice(&contents)?;
        if entry.url != key.url().as_str() {
            // Digest collision or a foreign file; never serve someone else's entry.
            return Ok(None);
        }
        entry.into_response().map(Some)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match tokio::fs::remove_dir_all(self.partition_dir(name)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn names(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && validate_name(name).is_ok()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
