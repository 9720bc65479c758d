//! On-device image cache for the marker-map application.
//!
//! Rendering surfaces (map pins, carousel, grid cards, avatar) hold remote
//! image references and ask this crate for a displayable local URI. The
//! cache resolves through a process-lifetime memory index, a durable
//! directory on local storage, and finally a streamed network download,
//! populating both layers on the way back. Call sites report render/decode
//! failures through [`ImageCache::invalidate`] so stale bytes get purged.

pub mod cache;
pub mod error;
pub mod fetch;
pub mod filename;
pub mod preload;
pub mod source_url;

pub use cache::{CacheConfig, DiskStore, ImageCache, LocalUriStyle, OnCacheFailure};
pub use error::CacheError;
pub use fetch::{HttpFetcher, RemoteFetcher};
pub use filename::derive_cache_filename;
pub use preload::{PreloadHandle, PreloadProgress, start_background_preload};
pub use source_url::{is_local_file, resolve_download_url};
