//! Transfer primitive: stream one URL to one destination file.
//!
//! Bytes go to `<dest>.part` first and are renamed into place only after the
//! body was fully written and synced, so a crash never leaves a truncated file
//! under the final name.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::DownloadError;
use super::constants::{CONNECT_TIMEOUT_SECS, PART_EXTENSION};

/// User-Agent sent with every transfer.
pub const USER_AGENT: &str = concat!("gallery-downloader/", env!("CARGO_PKG_VERSION"));

/// Moves the bytes behind `url` into `destination`.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Returns the number of bytes written.
    async fn transfer(
        &self,
        url: &str,
        destination: &Path,
        timeout: Duration,
    ) -> Result<u64, DownloadError>;
}

/// Streaming HTTP transfer on a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: Client,
}

impl HttpTransfer {
    /// Creates a transfer with the default connect timeout.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the client cannot be built (TLS backend
    /// initialisation failure).
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn send_request(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl Transfer for HttpTransfer {
    #[instrument(skip(self), fields(dest = %destination.display()))]
    async fn transfer(
        &self,
        url: &str,
        destination: &Path,
        timeout: Duration,
    ) -> Result<u64, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let response = self.send_request(url, timeout).await?;

        let part_path = part_path_for(destination);
        let file = File::create(&part_path)
            .await
            .map_err(|e| DownloadError::io(part_path.clone(), e))?;

        let written = match stream_to_file(file, response, url, &part_path).await {
            Ok(written) => written,
            Err(e) => {
                debug!(path = %part_path.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&part_path, destination).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(DownloadError::io(destination, e));
        }

        debug!(bytes = written, "transfer complete");
        Ok(written)
    }
}

/// Sibling path used while `destination` is being written.
#[must_use]
pub fn part_path_for(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".");
    name.push(PART_EXTENSION);
    destination.with_file_name(name)
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

/// Streams the response body into `file`, returning bytes written.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| map_reqwest_error(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;
    writer
        .get_ref()
        .sync_all()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
