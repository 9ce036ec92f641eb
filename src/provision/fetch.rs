//! HTTP fetcher contract.
//!
//! The resolver only needs "given a URL, put the bytes in this file"; the
//! trait seam keeps the network out of extraction tests and lets deployments
//! swap the transport.

use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// How long a single bundle download may take end to end.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Error types for bundle downloads
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request could not be sent or the transfer broke mid-stream.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("bad status fetching {url}: {status}")]
    BadStatus { url: String, status: u16 },

    /// Writing the downloaded bytes to disk failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Downloads a URL into a destination file.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` and write its body to `dest`, truncating any existing
    /// content. Cancellation is cooperative: dropping the returned future
    /// aborts the transfer.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// reqwest-backed fetcher with an explicit overall timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        debug!(url = %url, dest = %dest.display(), "downloading bundle");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FetchError::BadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        // Stream to disk chunk by chunk; bundles are tens of megabytes and
        // must not be buffered whole in memory.
        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }
}
