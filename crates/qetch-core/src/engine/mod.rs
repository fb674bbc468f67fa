//! Fetch engine - the heart of qetch
//!
//! This module implements the fragment/range download engine:
//! - Byte range partitioning per fragment
//! - Parallel ranged GETs written in place into pre-sized files
//! - Per-identity state machine and progress counter
//! - Interval progress notifications
//! - Ordered merge through the extractor

mod chunk_fetcher;
mod fragment;
mod manager;
mod partition;
mod progress;
mod registry;

pub use chunk_fetcher::*;
pub use fragment::*;
pub use manager::*;
pub use partition::*;
pub use progress::*;
pub use registry::*;

use crate::error::QetchError;
use std::future::Future;
use std::time::Duration;

/// Await `future`, failing with [`QetchError::Timeout`] after `timeout`
pub(crate) async fn timed<F>(
    timeout: Option<Duration>,
    url: &str,
    future: F,
) -> Result<F::Output, QetchError>
where
    F: Future,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| QetchError::Timeout {
                url: url.to_string(),
            }),
        None => Ok(future.await),
    }
}
