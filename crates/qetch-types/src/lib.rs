//! Shared types for qetch
//!
//! This crate contains the plain data structures exchanged between the
//! fetch engine and its callers (CLI, extractors, progress consumers).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// Download Identity & State
// ============================================================================

/// Opaque token minted once per `download()` call.
///
/// All progress and state bookkeeping inside the engine is keyed by it, so two
/// concurrent downloads never observe each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(Uuid);

impl DownloadId {
    /// Mint a fresh random identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DownloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a single download
///
/// `Preparing -> Running -> Finished | Stopped`. The two last states are
/// terminal and a download never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DownloadState {
    Preparing = 0,
    Running = 1,
    Finished = 2,
    Stopped = 3,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Finished | DownloadState::Stopped)
    }

    /// Position in the lifecycle; both terminal states share the last rank
    pub fn rank(&self) -> u8 {
        match self {
            DownloadState::Preparing => 0,
            DownloadState::Running => 1,
            DownloadState::Finished | DownloadState::Stopped => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DownloadState::Preparing),
            1 => Some(DownloadState::Running),
            2 => Some(DownloadState::Finished),
            3 => Some(DownloadState::Stopped),
            _ => None,
        }
    }
}

// ============================================================================
// Byte Ranges
// ============================================================================

/// An inclusive byte range, matching HTTP `Range` semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "inverted byte range {}-{}", start, end);
        Self { start, end }
    }

    /// Number of bytes covered by this range
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Never true; an inclusive range always covers at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value for the HTTP `Range` request header
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// Aggregate progress of one download, emitted on an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: DownloadId,
    pub current: u64,
    pub total: u64,
}

impl ProgressEvent {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.current as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

// ============================================================================
// API Types
// ============================================================================

/// Information about a fragment URL (from probing)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeInfo {
    pub url: String,
    pub final_url: String,
    pub length: u64,
    pub supports_range: bool,
    pub content_type: Option<String>,
}

// ============================================================================
// Settings Types
// ============================================================================

/// Engine settings, persisted as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Upper bound on fragments fetched concurrently
    pub max_fragments: usize,
    /// Upper bound on concurrent range requests per fragment
    pub max_connections: usize,
    /// Delay between progress notifications
    pub progress_interval_ms: u64,
    /// Per-read network timeout for chunk streams (0 disables it)
    pub read_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Largest increment written to disk between cancellation checks
    pub stream_chunk_size: usize,
    pub user_agent: String,
    /// Root for per-download working directories (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_fragments: 1,
            // many hosts throttle or ban above ~10 simultaneous connections
            max_connections: 8,
            progress_interval_ms: 100,
            read_timeout_secs: 30,
            connect_timeout_secs: 30,
            stream_chunk_size: 64 * 1024,
            user_agent: format!("qetch/{}", env!("CARGO_PKG_VERSION")),
            temp_dir: None,
        }
    }
}

impl EngineSettings {
    /// Check that the numeric limits are usable
    pub fn validate(&self) -> Result<(), String> {
        if self.max_fragments == 0 {
            return Err(format!(
                "'max_fragments' must be at least 1, received {}",
                self.max_fragments
            ));
        }
        if self.max_connections == 0 {
            return Err(format!(
                "'max_connections' must be at least 1, received {}",
                self.max_connections
            ));
        }
        if self.stream_chunk_size == 0 {
            return Err("'stream_chunk_size' must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_ids_are_unique() {
        let a = DownloadId::new();
        let b = DownloadId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }

    #[test]
    fn test_state_ranks() {
        assert!(DownloadState::Preparing.rank() < DownloadState::Running.rank());
        assert_eq!(DownloadState::Finished.rank(), DownloadState::Stopped.rank());
        assert!(!DownloadState::Running.is_terminal());
        assert!(DownloadState::Stopped.is_terminal());
        for state in [
            DownloadState::Preparing,
            DownloadState::Running,
            DownloadState::Finished,
            DownloadState::Stopped,
        ] {
            assert_eq!(DownloadState::from_u8(state as u8), Some(state));
        }
        assert_eq!(DownloadState::from_u8(9), None);
    }

    #[test]
    fn test_byte_range_header() {
        let range = ByteRange::new(100, 199);
        assert_eq!(range.len(), 100);
        assert_eq!(range.header_value(), "bytes=100-199");
    }

    #[test]
    fn test_settings_partial_json_uses_defaults() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{ "max_connections": 4 }"#).unwrap();
        assert_eq!(settings.max_connections, 4);
        assert_eq!(settings.max_fragments, 1);
        assert_eq!(settings.progress_interval_ms, 100);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validate_rejects_zero() {
        let settings = EngineSettings {
            max_connections: 0,
            ..EngineSettings::default()
        };
        assert!(settings.validate().unwrap_err().contains("max_connections"));
    }
}
