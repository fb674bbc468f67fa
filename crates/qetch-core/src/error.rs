//! Error types for qetch core

use qetch_types::{ByteRange, DownloadId};
use thiserror::Error;

/// Errors that can occur while fetching content
#[derive(Debug, Error)]
pub enum QetchError {
    #[error("Invalid option: {0}")]
    Precondition(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server error for {url}: {status}")]
    ServerError { url: String, status: u16 },

    #[error("No usable Content-Length for {url}")]
    MissingLength { url: String },

    #[error("Server ignored range {range} for {url}")]
    RangeIgnored { url: String, range: ByteRange },

    #[error("Timed out waiting on {url}")]
    Timeout { url: String },

    #[error("Connection to {url} closed after {received} of {expected} bytes")]
    Incomplete {
        url: String,
        expected: u64,
        received: u64,
    },

    #[error("Fragment {index} ({url}) failed: {source}")]
    Fragment {
        index: usize,
        url: String,
        #[source]
        source: Box<QetchError>,
    },

    #[error("Merge failed: {0}")]
    Merge(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Download {0} was cancelled")]
    Cancelled(DownloadId),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl QetchError {
    pub(crate) fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return QetchError::Timeout { url: url.into() };
        }
        QetchError::Network {
            url: url.into(),
            source,
        }
    }

    /// Check if this error came from talking to a remote host
    pub fn is_network(&self) -> bool {
        match self {
            QetchError::Network { .. }
            | QetchError::ServerError { .. }
            | QetchError::MissingLength { .. }
            | QetchError::RangeIgnored { .. }
            | QetchError::Timeout { .. }
            | QetchError::Incomplete { .. } => true,
            QetchError::Fragment { source, .. } => source.is_network(),
            _ => false,
        }
    }

    /// Index of the fragment that failed, if the error is tied to one
    pub fn fragment_index(&self) -> Option<usize> {
        match self {
            QetchError::Fragment { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// HTTP status returned by the server, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            QetchError::ServerError { status, .. } => Some(*status),
            QetchError::Network { source, .. } => source.status().map(|s| s.as_u16()),
            QetchError::Fragment { source, .. } => source.status(),
            _ => None,
        }
    }
}
