//! Fragment coordinator - fetches one fragment URL over several connections
//!
//! Probes the fragment for its length and range support, pre-sizes the
//! output file, partitions it into byte ranges and runs one chunk fetcher per
//! range.

use crate::engine::partition::partition;
use crate::engine::registry::DownloadSlot;
use crate::engine::timed;
use crate::engine::ChunkFetcher;
use crate::error::QetchError;
use qetch_types::{DownloadId, ProbeInfo};
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_u64(headers: &HeaderMap, name: &HeaderName) -> Option<u64> {
    header_str(headers, name).and_then(|s| s.trim().parse().ok())
}

/// Total size from a `Content-Range: bytes 0-0/12345` header
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, &reqwest::header::CONTENT_RANGE)
        .and_then(|s| s.rsplit('/').next())
        .filter(|total| *total != "*")
        .and_then(|total| total.trim().parse().ok())
}

/// Probe a fragment URL for its length and range support.
///
/// Uses HEAD first; when HEAD carries no `Content-Length`, falls back to a
/// one-byte ranged GET and reads the size from `Content-Range`.
pub async fn probe_fragment(
    client: &Client,
    url: &str,
    timeout: Option<Duration>,
) -> Result<ProbeInfo, QetchError> {
    let response = timed(timeout, url, client.head(url).send())
        .await?
        .map_err(|e| QetchError::network(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(QetchError::ServerError {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let headers = response.headers();
    let mut supports_range = header_str(headers, &reqwest::header::ACCEPT_RANGES)
        .map(|s| s.trim().eq_ignore_ascii_case("bytes"))
        .unwrap_or(false);
    let mut length = header_u64(headers, &reqwest::header::CONTENT_LENGTH);
    let content_type = header_str(headers, &reqwest::header::CONTENT_TYPE).map(str::to_string);
    let final_url = response.url().to_string();

    if length.is_none() {
        debug!("HEAD didn't return Content-Length, trying partial GET on {}", final_url);

        let response = timed(
            timeout,
            url,
            client
                .get(&final_url)
                .header(reqwest::header::RANGE, "bytes=0-0")
                .send(),
        )
        .await?
        .map_err(|e| QetchError::network(url, e))?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                supports_range = true;
                length = content_range_total(response.headers());
            }
            StatusCode::OK => {
                // server ignored the range and would send everything
                supports_range = false;
                length = header_u64(response.headers(), &reqwest::header::CONTENT_LENGTH);
            }
            other => {
                return Err(QetchError::ServerError {
                    url: url.to_string(),
                    status: other.as_u16(),
                });
            }
        }
    }

    let length = length.ok_or_else(|| QetchError::MissingLength {
        url: url.to_string(),
    })?;

    debug!(
        "Probed {}: {} bytes, range support: {}",
        url, length, supports_range
    );

    Ok(ProbeInfo {
        url: url.to_string(),
        final_url,
        length,
        supports_range,
        content_type,
    })
}

/// Fetches a single fragment into `output_path`
pub struct FragmentCoordinator {
    download_id: DownloadId,
    index: usize,
    url: String,
    output_path: PathBuf,
    client: Client,
    slot: Arc<DownloadSlot>,
    max_connections: usize,
    read_timeout: Option<Duration>,
    write_increment: usize,
}

impl FragmentCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        download_id: DownloadId,
        index: usize,
        url: String,
        output_path: PathBuf,
        client: Client,
        slot: Arc<DownloadSlot>,
        max_connections: usize,
    ) -> Self {
        Self {
            download_id,
            index,
            url,
            output_path,
            client,
            slot,
            max_connections: max_connections.max(1),
            read_timeout: None,
            write_increment: 64 * 1024,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_increment(mut self, bytes: usize) -> Self {
        self.write_increment = bytes.max(1);
        self
    }

    /// Run the fragment download, returning the path of the written file
    pub async fn run(self) -> Result<PathBuf, QetchError> {
        if self.slot.is_stopped() {
            return Err(QetchError::Cancelled(self.download_id));
        }

        let probe = probe_fragment(&self.client, &self.url, self.read_timeout).await?;

        // pre-size so chunk fetchers never grow the file
        let file = File::create(&self.output_path).await?;
        file.set_len(probe.length).await?;
        drop(file);

        if probe.length == 0 {
            info!("Fragment {} of download {} is empty", self.index, self.download_id);
            return Ok(self.output_path);
        }

        let connections = if probe.supports_range {
            self.max_connections
        } else {
            1
        };
        let ranges = partition(probe.length, connections);

        info!(
            "Fetching fragment {} of download {} ({} bytes, {} connections)",
            self.index,
            self.download_id,
            probe.length,
            ranges.len()
        );

        let mut join_set = JoinSet::new();
        for range in ranges {
            let fetcher = ChunkFetcher::new(
                self.download_id,
                self.index,
                probe.final_url.clone(),
                range,
                probe.length,
                probe.supports_range,
                self.output_path.clone(),
                self.client.clone(),
                self.slot.clone(),
            )
            .with_read_timeout(self.read_timeout)
            .with_write_increment(self.write_increment);

            join_set.spawn(async move { (range, fetcher.run().await) });
        }

        let mut written = 0u64;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((_, Ok(bytes))) => written += bytes,
                Ok((range, Err(e))) => {
                    warn!(
                        "Chunk {} of fragment {} failed: {}",
                        range, self.index, e
                    );
                    self.slot.stop();
                    // abort the remaining chunks and wait until none can touch the file
                    join_set.shutdown().await;
                    return Err(e);
                }
                Err(e) => {
                    self.slot.stop();
                    join_set.shutdown().await;
                    return Err(QetchError::Unknown(format!("Chunk task panicked: {}", e)));
                }
            }
        }

        if self.slot.is_stopped() {
            info!(
                "Fragment {} of download {} stopped after {} bytes",
                self.index, self.download_id, written
            );
            return Err(QetchError::Cancelled(self.download_id));
        }

        info!(
            "Fragment {} of download {} complete ({} bytes)",
            self.index, self.download_id, written
        );

        Ok(self.output_path)
    }
}
