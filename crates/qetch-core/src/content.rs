//! Content descriptors and the extractor contract
//!
//! An extractor turns a page URL into one or more [`Content`] values: an
//! ordered list of fragment URLs plus the merge step that turns the fetched
//! fragment files into the final deliverable.

use crate::engine::probe_fragment;
use crate::error::QetchError;
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use url::Url;

/// Site-specific producer of content; the engine only needs its merge step
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    /// Combine fragment files, given in fragment order, into one file
    async fn merge(&self, ordered_paths: &[PathBuf]) -> Result<PathBuf, QetchError>;
}

/// A downloadable piece of content
#[derive(Clone)]
pub struct Content {
    pub uid: String,
    pub source: Url,
    fragments: Vec<Url>,
    extractor: Arc<dyn Extractor>,
    pub title: Option<String>,
    size: Option<u64>,
}

impl Content {
    /// Create content from raw URLs; fragment order is the merge order
    pub fn new(
        uid: impl Into<String>,
        source: &str,
        fragments: Vec<String>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self, QetchError> {
        if fragments.is_empty() {
            return Err(QetchError::Precondition(
                "content must have at least one fragment".to_string(),
            ));
        }

        let source = Url::parse(source).map_err(|_| QetchError::InvalidUrl(source.to_string()))?;
        let fragments = fragments
            .iter()
            .map(|f| Url::parse(f).map_err(|_| QetchError::InvalidUrl(f.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            uid: uid.into(),
            source,
            fragments,
            extractor,
            title: None,
            size: None,
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Supply a known total size so no probing is needed
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn fragments(&self) -> &[Url] {
        &self.fragments
    }

    pub fn extractor(&self) -> &Arc<dyn Extractor> {
        &self.extractor
    }

    /// Total byte length: the known size, or the sum of every fragment's
    /// `Content-Length`
    pub async fn resolve_size(
        &self,
        client: &Client,
        timeout: Option<Duration>,
    ) -> Result<u64, QetchError> {
        if let Some(size) = self.size {
            return Ok(size);
        }

        let mut total = 0u64;
        for (index, fragment) in self.fragments.iter().enumerate() {
            let probe = probe_fragment(client, fragment.as_str(), timeout)
                .await
                .map_err(|e| QetchError::Fragment {
                    index,
                    url: fragment.to_string(),
                    source: Box::new(e),
                })?;
            total += probe.length;
        }

        debug!("Resolved size of {}: {} bytes", self.uid, total);
        Ok(total)
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content")
            .field("uid", &self.uid)
            .field("source", &self.source.as_str())
            .field("fragments", &self.fragments.len())
            .field("extractor", &self.extractor.name())
            .field("size", &self.size)
            .finish()
    }
}

/// Extractor for raw links: the page URL is the only fragment
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericExtractor;

impl GenericExtractor {
    pub const NAME: &'static str = "generic";

    /// Build the single-fragment content for a raw link
    pub fn extract(url: &str) -> Result<Content, QetchError> {
        Content::new(
            format!("{}-{}", Self::NAME, url),
            url,
            vec![url.to_string()],
            Arc::new(GenericExtractor),
        )
    }
}

#[async_trait]
impl Extractor for GenericExtractor {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn merge(&self, ordered_paths: &[PathBuf]) -> Result<PathBuf, QetchError> {
        match ordered_paths {
            [] => Err(QetchError::Merge("no fragments to merge".to_string())),
            [single] => Ok(single.clone()),
            [first, ..] => {
                let output = first.with_file_name("merged");
                concat_fragments(ordered_paths, &output).await
            }
        }
    }
}

fn merge_err(path: &Path, e: std::io::Error) -> QetchError {
    QetchError::Merge(format!("{}: {}", path.display(), e))
}

/// Concatenate fragment files, in order, into `output`
pub async fn concat_fragments(
    ordered_paths: &[PathBuf],
    output: &Path,
) -> Result<PathBuf, QetchError> {
    info!("Merging {} fragments into {:?}", ordered_paths.len(), output);

    let mut out = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(output)
        .await
        .map_err(|e| merge_err(output, e))?;

    let mut buffer = vec![0u8; 1024 * 1024];
    for path in ordered_paths {
        let mut input = File::open(path).await.map_err(|e| merge_err(path, e))?;
        loop {
            let n = input
                .read(&mut buffer)
                .await
                .map_err(|e| merge_err(path, e))?;
            if n == 0 {
                break;
            }
            out.write_all(&buffer[..n])
                .await
                .map_err(|e| merge_err(output, e))?;
        }
        debug!("Fragment {:?} merged", path);
    }

    out.flush().await.map_err(|e| merge_err(output, e))?;
    Ok(output.to_path_buf())
}
