//! The remote object-storage boundary: fetch bytes for a URL and stream them
//! to a file on disk.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::CacheError;

const USER_AGENT: &str = "marker-image-cache/0.1";
const ACCEPT: &str = "*/*";
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Transfers remote image bytes to local storage.
///
/// The production implementation is [`HttpFetcher`]; tests substitute fakes
/// to observe call counts and fetched URLs without touching the network.
pub trait RemoteFetcher: Send + Sync {
    /// Stream the body of `url` into the file at `dest`, returning the number
    /// of bytes written. A non-success HTTP status is an error.
    fn fetch_to_file<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<u64, CacheError>>;
}

/// `reqwest`-backed fetcher with a bounded per-download timeout.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, CacheError> {
        Self::with_timeout(DEFAULT_DOWNLOAD_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, CacheError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(USER_AGENT),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(ACCEPT),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(HttpFetcher { client })
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch_to_file<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<u64, CacheError>> {
        Box::pin(async move {
            debug!(url = %url, dest = %dest.display(), "Downloading image");

            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(CacheError::Download {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            // Stream chunks straight to disk so large images never sit fully
            // in memory.
            let mut file = tokio::fs::File::create(dest).await?;
            let mut stream = response.bytes_stream();
            let mut written = 0u64;

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }

            file.flush().await?;
            debug!(url = %url, bytes = written, "Download complete");
            Ok(written)
        })
    }
}
