//! Background pre-loading of marker images.
//!
//! When a marker set loads, every pin's photo can be warmed into the cache
//! ahead of rendering. Downloads run through a bounded pool rather than one
//! unbounded burst, with progress reported over a channel and cooperative
//! cancellation when the requesting surface goes away.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::ImageCache;
use crate::error::CacheError;

const MAX_CONCURRENT_DOWNLOADS: usize = 4;

#[derive(Debug, Clone)]
pub struct PreloadProgress {
    pub completed: usize,
    pub total: usize,
    pub errors: Vec<String>,
}

pub struct PreloadHandle {
    handle: JoinHandle<()>,
    progress_rx: tokio::sync::mpsc::UnboundedReceiver<PreloadProgress>,
    cancel_token: CancellationToken,
}

impl PreloadHandle {
    /// Get latest progress (non-blocking).
    pub fn try_get_progress(&mut self) -> Option<PreloadProgress> {
        // Drain all available progress messages and return the latest one
        let mut latest_progress = None;
        while let Ok(progress) = self.progress_rx.try_recv() {
            latest_progress = Some(progress);
        }
        latest_progress
    }

    /// Cancel background preloading.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Wait for completion.
    pub async fn wait_for_completion(self) -> Result<(), CacheError> {
        self.handle
            .await
            .map_err(|e| CacheError::Store(format!("Task join error: {}", e)))
    }

    /// Check if finished (non-blocking).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Start pre-loading `image_refs` into `cache` on a background task.
pub fn start_background_preload(cache: ImageCache, image_refs: Vec<String>) -> PreloadHandle {
    let (progress_tx, progress_rx) = tokio::sync::mpsc::unbounded_channel();
    let cancel_token = CancellationToken::new();
    let cancel_clone = cancel_token.clone();

    log::debug!(
        "Starting background preload for {} images",
        image_refs.len()
    );

    let handle = tokio::spawn(async move {
        preload_impl(cache, image_refs, progress_tx, cancel_clone).await;
    });

    PreloadHandle {
        handle,
        progress_rx,
        cancel_token,
    }
}

async fn preload_impl(
    cache: ImageCache,
    image_refs: Vec<String>,
    progress_tx: UnboundedSender<PreloadProgress>,
    cancel_token: CancellationToken,
) {
    let total = image_refs.len();
    let state = Arc::new(Mutex::new(PreloadProgress {
        completed: 0,
        total,
        errors: Vec::new(),
    }));

    send_progress(&progress_tx, state.lock().unwrap().clone());

    futures::stream::iter(image_refs)
        .for_each_concurrent(MAX_CONCURRENT_DOWNLOADS, |image_ref| {
            let cache = cache.clone();
            let cancel_token = cancel_token.clone();
            let progress_tx = progress_tx.clone();
            let state = state.clone();

            async move {
                if cancel_token.is_cancelled() {
                    log::debug!("Background preload cancelled, skipping {}", image_ref);
                    return;
                }

                let result = cache.cache_image(&image_ref).await;

                let progress = {
                    let mut state = state.lock().unwrap();
                    state.completed += 1;
                    if result.is_none() {
                        let error_msg = format!("Failed to preload {}", image_ref);
                        log::warn!("{}", error_msg);
                        state.errors.push(error_msg);
                    }
                    state.clone()
                };
                send_progress(&progress_tx, progress);
            }
        })
        .await;

    let final_state = state.lock().unwrap().clone();
    log::debug!(
        "Background preload finished - {}/{} completed, {} errors",
        final_state.completed,
        final_state.total,
        final_state.errors.len()
    );
}

fn send_progress(tx: &UnboundedSender<PreloadProgress>, progress: PreloadProgress) {
    if tx.send(progress).is_err() {
        // Receiver dropped, ignore
        log::debug!("Progress receiver dropped, stopping progress updates");
    }
}
