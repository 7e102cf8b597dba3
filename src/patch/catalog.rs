//! Remote catalog of installable mods.
//!
//! The catalog list is fetched once per URL through a [`CatalogSource`] and
//! cached until invalidated. The orchestrator invalidates it on every switch
//! because the list URL depends on the active identity.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::mods::DescriptorStore;

#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    #[error("Failed to fetch mod list from {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Invalid mod list from {url}: {message}")]
    Parse { url: String, message: String },
}

/// One entry of the remote mod list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Fields this host does not interpret, kept for presentation.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CatalogEntry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            author: None,
            description: None,
            version: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Fetches the raw mod list for a URL.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<CatalogEntry>, CatalogError>;
}

/// Reads mod lists from local JSON files. `file://` prefixes are accepted.
#[derive(Debug, Default, Clone)]
pub struct FileCatalogSource {
    base: Option<PathBuf>,
}

impl FileCatalogSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative locations against `base`.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    async fn fetch(&self, url: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
        let location = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        let path = match &self.base {
            Some(base) if location.is_relative() => base.join(location),
            _ => location,
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CatalogError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        serde_json::from_str(&content).map_err(|e| CatalogError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

struct CachedList {
    url: String,
    entries: Arc<Vec<CatalogEntry>>,
}

/// Caching front of a [`CatalogSource`].
pub struct ModCatalog {
    source: Arc<dyn CatalogSource>,
    cache: Mutex<Option<CachedList>>,
}

impl ModCatalog {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(None),
        }
    }

    /// Full mod list for `url`, fetched on first use or when `force_refresh`.
    pub async fn entries(
        &self,
        url: &str,
        force_refresh: bool,
    ) -> Result<Arc<Vec<CatalogEntry>>, CatalogError> {
        let cached = if force_refresh {
            None
        } else {
            self.cache
                .lock()
                .as_ref()
                .filter(|cached| cached.url == url)
                .map(|cached| cached.entries.clone())
        };
        if let Some(entries) = cached {
            return Ok(entries);
        }

        let entries = match self.source.fetch(url).await {
            Ok(entries) => Arc::new(entries),
            Err(e) => {
                error!(url = %url, error = %e, "Failed to fetch mod list");
                return Err(e);
            }
        };
        debug!(url = %url, count = entries.len(), "Mod list fetched");
        *self.cache.lock() = Some(CachedList {
            url: url.to_string(),
            entries: entries.clone(),
        });
        Ok(entries)
    }

    /// Catalog entries whose name is not installed locally.
    pub async fn installable(
        &self,
        url: &str,
        installed: &DescriptorStore,
        force_refresh: bool,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let entries = self.entries(url, force_refresh).await?;
        Ok(entries
            .iter()
            .filter(|entry| !installed.contains(&entry.name))
            .cloned()
            .collect())
    }

    /// Drop the cached list. Returns true if one was cached.
    pub fn invalidate(&self) -> bool {
        self.cache.lock().take().is_some()
    }

    pub fn is_cached(&self) -> bool {
        self.cache.lock().is_some()
    }
}
