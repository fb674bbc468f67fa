//! Progress bar for CLI downloads

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use qetch_core::QetchError;
use qetch_types::ProgressEvent;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Single progress bar driven by engine progress events
pub struct DownloadProgress {
    bar: ProgressBar,
}

impl DownloadProgress {
    pub fn new(label: impl Into<String>) -> anyhow::Result<Self> {
        // length is unknown until the first event
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
                .progress_chars("█▓▒░  "),
        );
        bar.set_message(label.into());
        Ok(Self { bar })
    }

    pub fn handle_event(&self, event: &ProgressEvent) {
        self.bar.set_length(event.total);
        self.bar.set_position(event.current.min(event.total));
    }

    /// Consume events until the engine drops its end of the channel
    pub fn follow(self, mut rx: UnboundedReceiver<ProgressEvent>) -> JoinHandle<Self> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.handle_event(&event);
            }
            self
        })
    }

    pub fn finish(&self, result: &Result<PathBuf, QetchError>) {
        match result {
            Ok(_) => self.bar.finish_with_message(format!(
                "{} Download complete",
                style("✓").green().bold()
            )),
            Err(QetchError::Cancelled(_)) => self
                .bar
                .abandon_with_message(format!("{} Cancelled", style("○").dim())),
            Err(e) => self.bar.abandon_with_message(format!(
                "{} Failed: {}",
                style("✗").red().bold(),
                e
            )),
        }
    }
}
