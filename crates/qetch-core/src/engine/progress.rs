//! Progress aggregator - periodic `(current, total)` notifications
//!
//! Purely advisory: it samples the download's byte counter on an interval and
//! never fails the download.

use crate::engine::registry::DownloadSlot;
use qetch_types::{DownloadId, ProgressEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Callback receiving progress notifications for a download
pub type ProgressHook = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Build a hook that forwards every notification into a channel
pub fn progress_channel() -> (ProgressHook, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let hook: ProgressHook = Arc::new(move |event| {
        // receiver gone means nobody is listening any more
        let _ = tx.send(event);
    });
    (hook, rx)
}

/// Polls one download's counter and reports it through a hook
pub struct ProgressAggregator {
    download_id: DownloadId,
    total: u64,
    slot: Arc<DownloadSlot>,
    hook: ProgressHook,
    interval: Duration,
}

impl ProgressAggregator {
    pub fn new(
        download_id: DownloadId,
        total: u64,
        slot: Arc<DownloadSlot>,
        hook: ProgressHook,
        interval: Duration,
    ) -> Self {
        Self {
            download_id,
            total,
            slot,
            hook,
            interval,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Report until the counter reaches the total or the download ends, then
    /// send one final `(total, total)` notification.
    pub async fn run(self) {
        let mut last = 0u64;

        loop {
            let current = self.slot.progress().min(self.total);
            if current >= self.total || self.slot.state().is_terminal() {
                break;
            }

            // the counter is monotonic, this only guards against clamping
            last = last.max(current);
            (self.hook)(ProgressEvent {
                id: self.download_id,
                current: last,
                total: self.total,
            });

            tokio::time::sleep(self.interval).await;
        }

        (self.hook)(ProgressEvent {
            id: self.download_id,
            current: self.total,
            total: self.total,
        });
        debug!("Progress reporting for download {} finished", self.download_id);
    }
}
