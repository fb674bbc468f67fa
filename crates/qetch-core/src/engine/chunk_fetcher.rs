//! Chunk fetcher - downloads one byte range of a fragment in place
//!
//! The fragment file is pre-sized by the coordinator, so every fetcher opens
//! its own handle, seeks to the start of its range and writes without
//! coordinating with its siblings.

use crate::engine::registry::DownloadSlot;
use crate::engine::timed;
use crate::error::QetchError;
use futures::StreamExt;
use qetch_types::{ByteRange, DownloadId};
use reqwest::{Client, StatusCode};
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

/// A worker that streams a single byte range into the fragment file
pub struct ChunkFetcher {
    download_id: DownloadId,
    fragment_index: usize,
    url: String,
    range: ByteRange,
    /// Length of the whole fragment this range belongs to
    fragment_length: u64,
    /// Send a `Range` header (the server advertised range support)
    ranged: bool,
    output_path: PathBuf,
    client: Client,
    slot: Arc<DownloadSlot>,
    read_timeout: Option<Duration>,
    write_increment: usize,
}

impl ChunkFetcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        download_id: DownloadId,
        fragment_index: usize,
        url: String,
        range: ByteRange,
        fragment_length: u64,
        ranged: bool,
        output_path: PathBuf,
        client: Client,
        slot: Arc<DownloadSlot>,
    ) -> Self {
        Self {
            download_id,
            fragment_index,
            url,
            range,
            fragment_length,
            ranged,
            output_path,
            client,
            slot,
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

    fn covers_fragment(&self) -> bool {
        self.range.start == 0 && self.range.len() == self.fragment_length
    }

    /// Run the range download, returning the number of bytes written.
    ///
    /// Returns early with a short count when the download is stopped.
    pub async fn run(self) -> Result<u64, QetchError> {
        debug!(
            "Starting chunk {} of fragment {} for download {}",
            self.range, self.fragment_index, self.download_id
        );

        if self.slot.is_stopped() {
            return Ok(0);
        }

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.output_path)
            .await?;
        file.seek(SeekFrom::Start(self.range.start)).await?;

        let mut request = self.client.get(&self.url);
        if self.ranged {
            request = request.header(reqwest::header::RANGE, self.range.header_value());
        }

        let response = timed(self.read_timeout, &self.url, request.send())
            .await?
            .map_err(|e| QetchError::network(&self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QetchError::ServerError {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        if self.ranged && status != StatusCode::PARTIAL_CONTENT && !self.covers_fragment() {
            return Err(QetchError::RangeIgnored {
                url: self.url.clone(),
                range: self.range,
            });
        }

        let expected = self.range.len();
        let mut remaining = expected;
        let mut stream = response.bytes_stream();

        'stream: while let Some(chunk_result) =
            timed(self.read_timeout, &self.url, stream.next()).await?
        {
            let chunk = chunk_result.map_err(|e| QetchError::network(&self.url, e))?;

            for piece in chunk.chunks(self.write_increment) {
                if self.slot.is_stopped() {
                    info!(
                        "Chunk {} of fragment {} stopped after {} bytes",
                        self.range,
                        self.fragment_index,
                        expected - remaining
                    );
                    file.flush().await?;
                    return Ok(expected - remaining);
                }

                // never write past the end of our range
                let take = (piece.len() as u64).min(remaining) as usize;
                file.write_all(&piece[..take]).await?;
                remaining -= take as u64;

                self.slot.add_progress(take as u64);
                self.slot.mark_running();

                if remaining == 0 {
                    break 'stream;
                }
            }
        }

        file.flush().await?;

        if remaining > 0 {
            if self.slot.is_stopped() {
                return Ok(expected - remaining);
            }
            return Err(QetchError::Incomplete {
                url: self.url.clone(),
                expected,
                received: expected - remaining,
            });
        }

        debug!(
            "Chunk {} of fragment {} complete ({} bytes)",
            self.range, self.fragment_index, expected
        );

        Ok(expected)
    }
}
