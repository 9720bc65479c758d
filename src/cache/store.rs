//! Durable cache store: one directory under the platform cache area, one
//! file per cache key. File presence is the only cache metadata; there is no
//! manifest, TTL, or freshness tracking.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::fetch::RemoteFetcher;

const CACHE_SUBDIR: &str = "image-cache";
const PARTIAL_SUFFIX: &str = ".partial";

/// How local URIs handed to the image-rendering layer are formatted.
///
/// Some rendering primitives need an explicit `file://` scheme, others a bare
/// filesystem path. This is a platform-compatibility rule, not formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalUriStyle {
    FileScheme,
    BarePath,
}

#[derive(Debug)]
pub struct DiskStore {
    cache_dir: PathBuf,
    uri_style: LocalUriStyle,
}

impl DiskStore {
    pub fn new(cache_dir: Option<PathBuf>, uri_style: LocalUriStyle) -> Self {
        let cache_dir = cache_dir.unwrap_or_else(default_cache_dir);
        DiskStore {
            cache_dir,
            uri_style,
        }
    }

    pub fn cache_dir(&self) -> &std::path::Path {
        &self.cache_dir
    }

    /// Idempotent creation of the cache directory, including parents.
    pub async fn ensure_directory(&self) -> Result<(), CacheError> {
        if !tokio::fs::try_exists(&self.cache_dir).await.unwrap_or(false) {
            tokio::fs::create_dir_all(&self.cache_dir).await?;
            info!(cache_dir = %self.cache_dir.display(), "Created image cache directory");
        }
        Ok(())
    }

    pub fn path_for(&self, cache_key: &str) -> PathBuf {
        self.cache_dir.join(cache_key)
    }

    pub async fn exists(&self, cache_key: &str) -> bool {
        tokio::fs::try_exists(self.path_for(cache_key))
            .await
            .unwrap_or(false)
    }

    /// Format the URI handed to the rendering primitive for a cached file.
    pub fn local_uri(&self, cache_key: &str) -> String {
        let path = self.path_for(cache_key);
        match self.uri_style {
            LocalUriStyle::FileScheme => format!("file://{}", path.display()),
            LocalUriStyle::BarePath => path.display().to_string(),
        }
    }

    /// Download `download_url` into the file for `cache_key`.
    ///
    /// Streams to a `.partial` sibling and renames on completion, so a
    /// half-written file is never visible at the final path. Re-downloads
    /// overwrite the same path; there is no versioning.
    pub async fn write(
        &self,
        cache_key: &str,
        download_url: &str,
        fetcher: &dyn RemoteFetcher,
    ) -> Result<PathBuf, CacheError> {
        self.ensure_directory().await?;

        let final_path = self.path_for(cache_key);
        let partial_path = self.cache_dir.join(format!("{}{}", cache_key, PARTIAL_SUFFIX));

        match fetcher.fetch_to_file(download_url, &partial_path).await {
            Ok(bytes) => {
                tokio::fs::rename(&partial_path, &final_path).await?;
                debug!(
                    cache_key = %cache_key,
                    bytes = bytes,
                    path = %final_path.display(),
                    "Image written to cache store"
                );
                Ok(final_path)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial_path).await
                    && cleanup.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(path = %partial_path.display(), error = %cleanup, "Failed to remove partial download");
                }
                Err(e)
            }
        }
    }

    /// Idempotent single-file delete; succeeds if the file is already gone.
    pub async fn delete(&self, cache_key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.path_for(cache_key)).await {
            Ok(()) => {
                debug!(cache_key = %cache_key, "Deleted cached image file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the whole directory tree and recreate it empty.
    pub async fn delete_all(&self) -> Result<(), CacheError> {
        match tokio::fs::remove_dir_all(&self.cache_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        info!(cache_dir = %self.cache_dir.display(), "Cleared image cache directory");
        Ok(())
    }
}

fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "marker-map")
        .map(|proj_dirs| proj_dirs.cache_dir().join(CACHE_SUBDIR))
        .unwrap_or_else(|| std::env::temp_dir().join("marker-map").join(CACHE_SUBDIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::path::Path;

    struct StubFetcher {
        payload: Vec<u8>,
        fail: bool,
    }

    impl RemoteFetcher for StubFetcher {
        fn fetch_to_file<'a>(
            &'a self,
            url: &'a str,
            dest: &'a Path,
        ) -> BoxFuture<'a, Result<u64, CacheError>> {
            Box::pin(async move {
                if self.fail {
                    return Err(CacheError::Download {
                        url: url.to_string(),
                        status: 404,
                    });
                }
                tokio::fs::write(dest, &self.payload).await?;
                Ok(self.payload.len() as u64)
            })
        }
    }

    fn test_store(name: &str) -> DiskStore {
        let dir = std::env::temp_dir().join(format!(
            "marker-image-cache-store-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        DiskStore::new(Some(dir), LocalUriStyle::FileScheme)
    }

    #[tokio::test]
    async fn test_ensure_directory_is_idempotent() {
        let store = test_store("ensure");
        store.ensure_directory().await.unwrap();
        store.ensure_directory().await.unwrap();
        assert!(store.cache_dir().exists());
    }

    #[tokio::test]
    async fn test_write_places_file_and_removes_partial() {
        let store = test_store("write");
        let fetcher = StubFetcher {
            payload: b"image bytes".to_vec(),
            fail: false,
        };

        let path = store
            .write("sunset.jpg", "https://cdn.example.com/photos/sunset.jpg", &fetcher)
            .await
            .unwrap();

        assert!(store.exists("sunset.jpg").await);
        assert_eq!(std::fs::read(&path).unwrap(), b"image bytes");
        assert!(!store.path_for("sunset.jpg.partial").exists());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_file() {
        let store = test_store("write-fail");
        let fetcher = StubFetcher {
            payload: Vec::new(),
            fail: true,
        };

        let result = store
            .write("missing.jpg", "https://cdn.example.com/missing.jpg", &fetcher)
            .await;

        assert!(result.is_err());
        assert!(!store.exists("missing.jpg").await);
        assert!(!store.path_for("missing.jpg.partial").exists());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = test_store("delete");
        store.ensure_directory().await.unwrap();

        store.delete("never-written.jpg").await.unwrap();

        std::fs::write(store.path_for("photo.jpg"), b"x").unwrap();
        store.delete("photo.jpg").await.unwrap();
        assert!(!store.exists("photo.jpg").await);
        store.delete("photo.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_all_recreates_empty_directory() {
        let store = test_store("delete-all");
        store.ensure_directory().await.unwrap();
        std::fs::write(store.path_for("a.jpg"), b"a").unwrap();
        std::fs::write(store.path_for("b.jpg"), b"b").unwrap();

        store.delete_all().await.unwrap();

        assert!(store.cache_dir().exists());
        assert_eq!(std::fs::read_dir(store.cache_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_local_uri_styles() {
        let dir = std::env::temp_dir().join(format!(
            "marker-image-cache-store-uri-{}",
            std::process::id()
        ));

        let with_scheme = DiskStore::new(Some(dir.clone()), LocalUriStyle::FileScheme);
        let uri = with_scheme.local_uri("photo.jpg");
        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with("photo.jpg"));

        let bare = DiskStore::new(Some(dir), LocalUriStyle::BarePath);
        let uri = bare.local_uri("photo.jpg");
        assert!(!uri.starts_with("file://"));
        assert!(uri.ends_with("photo.jpg"));
    }
}
