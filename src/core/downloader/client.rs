use std::path::Path;

use futures_util::StreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult, SourceAttempt};
use crate::core::progress::ProgressReporter;

/// Which source satisfied a [`Downloader::fetch`] and how much it delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub url: String,
    pub bytes: u64,
    /// Sources that failed before `url` succeeded, in the order tried.
    pub failed_attempts: Vec<SourceAttempt>,
}

/// Streaming downloader with ordered mirror fallback.
///
/// Every attempt inherits the client's connect/read timeout.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    /// Maximum number of downloads a batch runs at once.
    concurrency: usize,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // ── Mirrored fetch ──────────────────────────────────

    /// Stream `primary` into `dest`, falling back to each of `fallbacks` in
    /// order. The first source that answers with a success status and delivers
    /// its whole body wins.
    ///
    /// When every source fails `dest` is removed and the error lists each
    /// attempt in the order it was made.
    pub async fn fetch(
        &self,
        primary: &str,
        fallbacks: &[String],
        dest: &Path,
        progress: &dyn ProgressReporter,
    ) -> LauncherResult<FetchOutcome> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| LauncherError::io(parent, source))?;
        }

        let sources = std::iter::once(primary).chain(fallbacks.iter().map(String::as_str));
        let mut attempts = Vec::new();

        for url in sources {
            match self.fetch_once(url, dest, progress).await {
                Ok(bytes) => {
                    if !attempts.is_empty() {
                        info!("Fetched {:?} from fallback {}", dest, url);
                    }
                    debug!("Downloaded: {} -> {:?} ({} bytes)", url, dest, bytes);
                    return Ok(FetchOutcome {
                        url: url.to_string(),
                        bytes,
                        failed_attempts: attempts,
                    });
                }
                Err(attempt) => {
                    warn!("Source failed: {}", attempt);
                    attempts.push(attempt);
                }
            }
        }

        if let Err(err) = tokio::fs::remove_file(dest).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("Cannot remove partial download {:?}: {}", dest, err);
            }
        }

        Err(LauncherError::Network {
            target: dest.to_string_lossy().to_string(),
            attempts,
        })
    }

    async fn fetch_once(
        &self,
        url: &str,
        dest: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<u64, SourceAttempt> {
        let attempt = |status: Option<u16>, error: String| SourceAttempt {
            url: url.to_string(),
            status,
            error,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| attempt(None, describe_transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(attempt(
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or("request failed").to_string(),
            ));
        }

        let total = response.content_length();
        let label = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        // The handle is dropped at the end of this block, before any caller
        // re-opens the file for verification.
        let written = {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| attempt(Some(status.as_u16()), format!("cannot create {:?}: {}", dest, e)))?;

            let mut stream = response.bytes_stream();
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| attempt(Some(status.as_u16()), describe_transport_error(&e)))?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| attempt(Some(status.as_u16()), format!("write failed: {}", e)))?;
                written += chunk.len() as u64;
                if let Some(total) = total {
                    progress.report(written, total, &label);
                }
            }
            file.flush()
                .await
                .map_err(|e| attempt(Some(status.as_u16()), format!("flush failed: {}", e)))?;
            written
        };

        if let Some(total) = total {
            if written < total {
                return Err(attempt(
                    Some(status.as_u16()),
                    format!("body truncated: {} of {} bytes", written, total),
                ));
            }
        }

        Ok(written)
    }

    // ── Single-endpoint JSON ────────────────────────────

    /// GET `url` and decode its body. Returns the parsed value and the raw text
    /// so callers can persist exactly what the server sent.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> LauncherResult<(T, String)> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let raw = response.text().await?;
        let parsed = serde_json::from_str(&raw)?;
        Ok((parsed, raw))
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}
