//! The image cache service: memory index, read-through disk resolution,
//! invalidation, and full clear.
//!
//! Resolution order is memory, then disk, then network. Every operation
//! degrades to a cache miss instead of surfacing an error to rendering code:
//! download and filesystem failures are logged and converted to `None` (or
//! the original reference, under [`OnCacheFailure::UseOriginalUrl`]).

mod store;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::fetch::{DEFAULT_DOWNLOAD_TIMEOUT, HttpFetcher, RemoteFetcher};
use crate::filename::derive_cache_filename;
use crate::source_url::{is_local_file, resolve_download_url};

pub use store::{DiskStore, LocalUriStyle};

/// What a population call returns when the download fails.
///
/// The original reference keeps the caller able to attempt a direct network
/// render; a placeholder (`None`) tells it to give up on this image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnCacheFailure {
    UseOriginalUrl,
    ShowPlaceholder,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache directory override; `None` resolves the platform cache area.
    pub cache_dir: Option<PathBuf>,
    pub uri_style: LocalUriStyle,
    pub download_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            cache_dir: None,
            uri_style: LocalUriStyle::FileScheme,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

/// Process-wide image cache, constructed once at application startup and
/// handed by clone to every rendering surface that resolves marker photos.
#[derive(Clone)]
pub struct ImageCache {
    inner: Arc<Inner>,
}

struct Inner {
    store: DiskStore,
    fetcher: Box<dyn RemoteFetcher>,
    /// source_ref -> local_uri, process lifetime, no eviction. Entries are
    /// short strings bounded by the user's marker set.
    memory: RwLock<HashMap<String, String>>,
    /// Per-key download gates for single-flight de-duplication.
    inflight: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ImageCache {
    pub fn new() -> Result<Self, CacheError> {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Result<Self, CacheError> {
        let fetcher = HttpFetcher::with_timeout(config.download_timeout)?;
        Ok(Self::with_fetcher(config, Box::new(fetcher)))
    }

    /// Construct with an explicit fetcher. Tests use this to substitute a
    /// counting fake for the network.
    pub fn with_fetcher(config: CacheConfig, fetcher: Box<dyn RemoteFetcher>) -> Self {
        ImageCache {
            inner: Arc::new(Inner {
                store: DiskStore::new(config.cache_dir, config.uri_style),
                fetcher,
                memory: RwLock::new(HashMap::new()),
                inflight: AsyncMutex::new(HashMap::new()),
            }),
        }
    }

    /// Create the cache directory. Called at application startup; failure is
    /// logged and the cache degrades to always-miss.
    pub async fn initialize(&self) {
        if let Err(e) = self.inner.store.ensure_directory().await {
            warn!(error = %e, "Failed to initialize image cache directory");
        }
    }

    pub fn cache_dir(&self) -> &Path {
        self.inner.store.cache_dir()
    }

    /// Non-downloading lookup: memory, local-file identity, then disk.
    /// Returns `None` on a miss; the caller decides whether to populate.
    pub async fn get_cached_uri(&self, source_ref: &str) -> Option<String> {
        let source_ref = non_empty(source_ref)?;

        if let Some(uri) = self.memory_get(source_ref) {
            debug!(url = %source_ref, "Image cache memory HIT");
            return Some(uri);
        }

        // Local files are already cached by definition.
        if is_local_file(source_ref) {
            self.memory_put(source_ref, source_ref);
            return Some(source_ref.to_string());
        }

        let cache_key = derive_cache_filename(source_ref);
        if self.inner.store.exists(&cache_key).await {
            let uri = self.inner.store.local_uri(&cache_key);
            self.memory_put(source_ref, &uri);
            debug!(url = %source_ref, cache_key = %cache_key, "Image cache disk HIT");
            return Some(uri);
        }

        debug!(url = %source_ref, "Image cache MISS");
        None
    }

    /// Read-through population: resolve through memory and disk, downloading
    /// on a miss. Idempotent; repeated calls for the same reference converge
    /// to the same URI with a single download.
    pub async fn cache_image(&self, source_ref: &str) -> Option<String> {
        self.cache_image_with_policy(source_ref, OnCacheFailure::ShowPlaceholder)
            .await
    }

    pub async fn cache_image_with_policy(
        &self,
        source_ref: &str,
        on_failure: OnCacheFailure,
    ) -> Option<String> {
        let source_ref = non_empty(source_ref)?;

        if let Some(uri) = self.memory_get(source_ref) {
            return Some(uri);
        }

        if is_local_file(source_ref) {
            self.memory_put(source_ref, source_ref);
            return Some(source_ref.to_string());
        }

        let cache_key = derive_cache_filename(source_ref);
        if self.inner.store.exists(&cache_key).await {
            let uri = self.inner.store.local_uri(&cache_key);
            self.memory_put(source_ref, &uri);
            return Some(uri);
        }

        // Single flight per key: concurrent misses for the same image queue
        // behind one download instead of racing it.
        let gate = self.download_gate(&cache_key).await;
        let _guard = gate.lock().await;

        if self.inner.store.exists(&cache_key).await {
            let uri = self.inner.store.local_uri(&cache_key);
            self.memory_put(source_ref, &uri);
            debug!(url = %source_ref, cache_key = %cache_key, "Image cached by concurrent request");
            return Some(uri);
        }

        let download_url = resolve_download_url(source_ref);
        match self
            .inner
            .store
            .write(&cache_key, &download_url, self.inner.fetcher.as_ref())
            .await
        {
            Ok(_) => {
                let uri = self.inner.store.local_uri(&cache_key);
                self.memory_put(source_ref, &uri);
                debug!(url = %source_ref, uri = %uri, "Image cached");
                Some(uri)
            }
            Err(e) => {
                warn!(url = %source_ref, error = %e, "Failed to cache image");
                match on_failure {
                    OnCacheFailure::UseOriginalUrl => Some(source_ref.to_string()),
                    OnCacheFailure::ShowPlaceholder => None,
                }
            }
        }
    }

    /// Purge one entry after a render/decode failure so the next resolution
    /// re-downloads fresh bytes. Accepts either the source reference or the
    /// local URI; both derive the same cache key. Best effort, no retry.
    pub async fn invalidate(&self, image_ref: &str) {
        let Some(image_ref) = non_empty(image_ref) else {
            return;
        };

        let cache_key = derive_cache_filename(image_ref);
        if let Err(e) = self.inner.store.delete(&cache_key).await {
            warn!(url = %image_ref, error = %e, "Failed to invalidate cached image");
        }

        // Drop memory entries that reference the deleted file, whether keyed
        // by this reference or resolving to its URI.
        let stale_uri = self.inner.store.local_uri(&cache_key);
        let mut memory = self.inner.memory.write().unwrap();
        memory.retain(|source, uri| source != image_ref && *uri != stale_uri);
        debug!(url = %image_ref, cache_key = %cache_key, "Invalidated cache entry");
    }

    /// Drop the memory index and recreate the cache directory empty.
    pub async fn clear_cache(&self) {
        self.inner.memory.write().unwrap().clear();
        if let Err(e) = self.inner.store.delete_all().await {
            warn!(error = %e, "Failed to clear image cache directory");
        }
        info!("Image cache cleared");
    }

    /// Number of references resolved in the memory index.
    pub fn memory_len(&self) -> usize {
        self.inner.memory.read().unwrap().len()
    }

    fn memory_get(&self, source_ref: &str) -> Option<String> {
        self.inner.memory.read().unwrap().get(source_ref).cloned()
    }

    fn memory_put(&self, source_ref: &str, local_uri: &str) {
        self.inner
            .memory
            .write()
            .unwrap()
            .insert(source_ref.to_string(), local_uri.to_string());
    }

    async fn download_gate(&self, cache_key: &str) -> Arc<AsyncMutex<()>> {
        let mut inflight = self.inner.inflight.lock().await;
        inflight
            .entry(cache_key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

fn non_empty(source_ref: &str) -> Option<&str> {
    let trimmed = source_ref.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}
