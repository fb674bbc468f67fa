//! Download engine - top-level orchestrator for content downloads
//!
//! This is the coordinator that:
//! - Mints a download identity and its isolated working directory
//! - Runs one fragment coordinator per fragment, bounded by `max_fragments`
//! - Drives the download state machine and the progress aggregator
//! - Hands the ordered fragment files to the extractor's merge step and moves
//!   the result to its destination

use crate::config::{build_client, read_timeout};
use crate::content::Content;
use crate::engine::registry::{Registry, SlotGuard};
use crate::engine::{probe_fragment, FragmentCoordinator, ProgressAggregator, ProgressHook};
use crate::error::QetchError;
use qetch_types::{DownloadId, DownloadState, EngineSettings, ProbeInfo};
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Per-call options for [`DownloadEngine::download`]
#[derive(Clone)]
pub struct DownloadOptions {
    /// Upper bound on fragments processed concurrently
    pub max_fragments: usize,
    /// Upper bound on concurrent byte-range requests per fragment
    pub max_connections: usize,
    pub progress_hook: Option<ProgressHook>,
    pub progress_interval: Duration,
}

impl DownloadOptions {
    pub fn with_max_fragments(mut self, max_fragments: usize) -> Self {
        self.max_fragments = max_fragments;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_progress_hook(mut self, hook: ProgressHook) -> Self {
        self.progress_hook = Some(hook);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), QetchError> {
        if self.max_fragments == 0 {
            return Err(QetchError::Precondition(format!(
                "'max_fragments' must be at least 1, received {}",
                self.max_fragments
            )));
        }
        if self.max_connections == 0 {
            return Err(QetchError::Precondition(format!(
                "'max_connections' must be at least 1, received {}",
                self.max_connections
            )));
        }
        Ok(())
    }
}

impl From<&EngineSettings> for DownloadOptions {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            max_fragments: settings.max_fragments,
            max_connections: settings.max_connections,
            progress_hook: None,
            progress_interval: Duration::from_millis(settings.progress_interval_ms),
        }
    }
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("max_fragments", &self.max_fragments)
            .field("max_connections", &self.max_connections)
            .field("progress_hook", &self.progress_hook.is_some())
            .field("progress_interval", &self.progress_interval)
            .finish()
    }
}

/// Handle to a download running in the background
pub struct DownloadHandle {
    id: DownloadId,
    task: JoinHandle<Result<PathBuf, QetchError>>,
}

impl DownloadHandle {
    pub fn id(&self) -> DownloadId {
        self.id
    }

    /// Wait for the download to finish
    pub async fn join(self) -> Result<PathBuf, QetchError> {
        self.task
            .await
            .map_err(|e| QetchError::Unknown(format!("Download task failed: {}", e)))?
    }
}

/// Fetch engine shared by any number of concurrent downloads
#[derive(Clone)]
pub struct DownloadEngine {
    client: Client,
    settings: Arc<EngineSettings>,
    registry: Registry,
}

impl DownloadEngine {
    /// Create an engine with its own HTTP client
    pub fn new(settings: EngineSettings) -> Result<Self, QetchError> {
        settings.validate().map_err(QetchError::Config)?;
        let client = build_client(&settings)?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: Client, settings: EngineSettings) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
            registry: Registry::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Default per-call options derived from the engine settings
    pub fn options(&self) -> DownloadOptions {
        DownloadOptions::from(self.settings.as_ref())
    }

    /// Probe a URL for its length and range support
    pub async fn probe(&self, url: &str) -> Result<ProbeInfo, QetchError> {
        info!("Probing URL: {}", url);
        probe_fragment(&self.client, url, read_timeout(&self.settings)).await
    }

    /// Download `content` to `destination`, returning the destination path
    pub async fn download(
        &self,
        content: &Content,
        destination: impl AsRef<Path>,
        options: DownloadOptions,
    ) -> Result<PathBuf, QetchError> {
        options.validate()?;
        let guard = self.registry.register(DownloadId::new());
        self.run(guard, content, destination.as_ref(), options).await
    }

    /// Start a download in the background. The identity is live as soon as
    /// this returns, so it can be cancelled right away.
    pub fn spawn(
        &self,
        content: Content,
        destination: PathBuf,
        options: DownloadOptions,
    ) -> DownloadHandle {
        let guard = self.registry.register(DownloadId::new());
        let id = guard.id();
        let engine = self.clone();

        let task = tokio::spawn(async move {
            options.validate()?;
            engine.run(guard, &content, &destination, options).await
        });

        DownloadHandle { id, task }
    }

    /// Request cooperative cancellation. Returns false if the download is
    /// unknown or already finished.
    pub fn cancel(&self, id: DownloadId) -> bool {
        let stopped = self
            .registry
            .get(id)
            .map(|slot| slot.stop())
            .unwrap_or(false);
        if stopped {
            info!("Download {} cancelled", id);
        }
        stopped
    }

    pub fn state(&self, id: DownloadId) -> Option<DownloadState> {
        self.registry.get(id).map(|slot| slot.state())
    }

    /// Bytes transferred so far for a live download
    pub fn progress(&self, id: DownloadId) -> Option<u64> {
        self.registry.get(id).map(|slot| slot.progress())
    }

    pub fn active_downloads(&self) -> Vec<DownloadId> {
        self.registry.ids()
    }

    async fn run(
        &self,
        guard: SlotGuard,
        content: &Content,
        destination: &Path,
        options: DownloadOptions,
    ) -> Result<PathBuf, QetchError> {
        let id = guard.id();
        info!(
            "Starting download {} for {} ({} fragments, max_fragments={}, max_connections={})",
            id,
            content.uid,
            content.fragments().len(),
            options.max_fragments,
            options.max_connections
        );

        let workspace = self.create_workspace(id).await?;

        let mut progress = None;
        let result = match self.start_progress(&guard, content, &options).await {
            Ok(handle) => {
                progress = handle;
                self.fetch_and_merge(&guard, content, workspace.path(), destination, &options)
                    .await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(path) => info!("Download {} completed: {:?}", id, path),
            Err(e) => {
                guard.stop();
                error!("Download {} failed: {}", id, e);
            }
        }

        // the aggregator exits once the state is terminal
        if let Some(handle) = progress {
            if let Err(e) = handle.await {
                warn!("Progress reporter for download {} panicked: {}", id, e);
            }
        }

        match tokio::task::spawn_blocking(move || workspace.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to remove working directory of download {}: {}", id, e),
            Err(e) => warn!("Working directory cleanup for download {} failed: {}", id, e),
        }

        result
    }

    /// Spawn the progress aggregator when the caller asked for progress
    async fn start_progress(
        &self,
        guard: &SlotGuard,
        content: &Content,
        options: &DownloadOptions,
    ) -> Result<Option<JoinHandle<()>>, QetchError> {
        let Some(hook) = &options.progress_hook else {
            return Ok(None);
        };

        let total = content
            .resolve_size(&self.client, read_timeout(&self.settings))
            .await?;
        let aggregator = ProgressAggregator::new(
            guard.id(),
            total,
            guard.slot(),
            hook.clone(),
            options.progress_interval,
        );
        Ok(Some(aggregator.spawn()))
    }

    async fn create_workspace(&self, id: DownloadId) -> Result<TempDir, QetchError> {
        let root = match &self.settings.temp_dir {
            Some(dir) => {
                fs::create_dir_all(dir).await?;
                dir.clone()
            }
            None => std::env::temp_dir(),
        };

        let prefix = format!("qetch[{}]-", id);
        let workspace = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(root)
        })
        .await
        .map_err(|e| QetchError::Unknown(format!("Working directory task failed: {}", e)))??;
        debug!("Working directory for download {}: {:?}", id, workspace.path());
        Ok(workspace)
    }

    async fn fetch_and_merge(
        &self,
        guard: &SlotGuard,
        content: &Content,
        workdir: &Path,
        destination: &Path,
        options: &DownloadOptions,
    ) -> Result<PathBuf, QetchError> {
        let paths = self.fetch_fragments(guard, content, workdir, options).await?;

        if !guard.finish() {
            return Err(QetchError::Cancelled(guard.id()));
        }

        info!("All fragments of download {} complete, merging...", guard.id());
        let merged = content.extractor().merge(&paths).await?;
        move_into_place(&merged, destination).await?;

        Ok(destination.to_path_buf())
    }

    /// Fetch every fragment, returning the files in fragment order
    async fn fetch_fragments(
        &self,
        guard: &SlotGuard,
        content: &Content,
        workdir: &Path,
        options: &DownloadOptions,
    ) -> Result<Vec<PathBuf>, QetchError> {
        let id = guard.id();
        let fragments = content.fragments();
        let semaphore = Arc::new(Semaphore::new(options.max_fragments));
        let mut join_set = JoinSet::new();

        for (index, url) in fragments.iter().enumerate() {
            let url = url.to_string();
            let coordinator = FragmentCoordinator::new(
                id,
                index,
                url.clone(),
                workdir.join(index.to_string()),
                self.client.clone(),
                guard.slot(),
                options.max_connections,
            )
            .with_read_timeout(read_timeout(&self.settings))
            .with_write_increment(self.settings.stream_chunk_size);
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => coordinator.run().await,
                    Err(e) => Err(QetchError::Unknown(e.to_string())),
                };
                (index, url, result)
            });
        }

        let mut paths: Vec<Option<PathBuf>> = vec![None; fragments.len()];
        let mut cancelled = false;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, _, Ok(path))) => {
                    debug!("Fragment {} of download {} written to {:?}", index, id, path);
                    paths[index] = Some(path);
                }
                Ok((_, _, Err(QetchError::Cancelled(_)))) => cancelled = true,
                Ok((index, url, Err(e))) => {
                    error!("Fragment {} of download {} failed: {}", index, id, e);
                    guard.stop();
                    // the working directory is removed next, so wait for the aborts
                    join_set.shutdown().await;
                    return Err(QetchError::Fragment {
                        index,
                        url,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    guard.stop();
                    join_set.shutdown().await;
                    return Err(QetchError::Unknown(format!(
                        "Fragment task panicked: {}",
                        e
                    )));
                }
            }
        }

        if cancelled || guard.is_stopped() {
            return Err(QetchError::Cancelled(id));
        }

        paths
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| QetchError::Unknown("Fragment result missing".to_string()))
    }
}

/// Move the merged file to its destination, copying across filesystems
async fn move_into_place(from: &Path, to: &Path) -> Result<(), QetchError> {
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    if let Err(e) = fs::rename(from, to).await {
        debug!("Rename {:?} -> {:?} failed ({}), copying instead", from, to, e);
        if let Err(e) = fs::copy(from, to).await {
            let _ = fs::remove_file(to).await;
            return Err(e.into());
        }
        let _ = fs::remove_file(from).await;
    }

    Ok(())
}
