//! Qetch Core - Fetch Engine
//!
//! This crate downloads content that is split into an ordered list of remote
//! fragments, each fetched over several concurrent byte-range requests, and
//! reassembles it through the extractor's merge step.

pub mod config;
mod content;
pub mod engine;
mod error;

pub use content::*;
pub use engine::{
    partition, probe_fragment, progress_channel, DownloadEngine, DownloadHandle,
    DownloadOptions, ProgressHook,
};
pub use error::*;

pub use qetch_types as types;
