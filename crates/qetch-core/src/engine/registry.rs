//! Per-download bookkeeping shared between the engine and its workers
//!
//! Each download identity owns exactly one [`DownloadSlot`]: a monotonic
//! state cell plus an atomic byte counter. Chunk fetchers increment the
//! counter and poll the state; the progress aggregator only reads.

use parking_lot::RwLock;
use qetch_types::{DownloadId, DownloadState};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

/// State and progress for one download identity
#[derive(Debug)]
pub struct DownloadSlot {
    state: AtomicU8,
    progress: AtomicU64,
}

impl DownloadSlot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(DownloadState::Preparing as u8),
            progress: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> DownloadState {
        DownloadState::from_u8(self.state.load(Ordering::Acquire))
            .unwrap_or(DownloadState::Stopped)
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == DownloadState::Stopped
    }

    /// Move forward to `next`. Returns false if the transition would go
    /// backwards, sideways or out of a terminal state.
    pub fn advance(&self, next: DownloadState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let current = DownloadState::from_u8(current)?;
                if current.is_terminal() || next.rank() <= current.rank() {
                    None
                } else {
                    Some(next as u8)
                }
            })
            .is_ok()
    }

    /// Flag the download as started; only the first caller wins
    pub fn mark_running(&self) -> bool {
        self.advance(DownloadState::Running)
    }

    pub fn finish(&self) -> bool {
        self.advance(DownloadState::Finished)
    }

    pub fn stop(&self) -> bool {
        self.advance(DownloadState::Stopped)
    }

    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Acquire)
    }

    /// Add transferred bytes, returning the new total
    pub fn add_progress(&self, bytes: u64) -> u64 {
        self.progress.fetch_add(bytes, Ordering::AcqRel) + bytes
    }
}

/// Identity-keyed table of live download slots
#[derive(Debug, Clone, Default)]
pub struct Registry {
    slots: Arc<RwLock<HashMap<DownloadId, Arc<DownloadSlot>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the slot for `id`. The slot is removed when the guard drops.
    pub fn register(&self, id: DownloadId) -> SlotGuard {
        let slot = Arc::new(DownloadSlot::new());
        let previous = self.slots.write().insert(id, slot.clone());
        debug_assert!(previous.is_none(), "download id {} registered twice", id);
        debug!("Registered download {}", id);

        SlotGuard {
            registry: self.clone(),
            id,
            slot,
        }
    }

    pub fn get(&self, id: DownloadId) -> Option<Arc<DownloadSlot>> {
        self.slots.read().get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<DownloadId> {
        self.slots.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    fn remove(&self, id: DownloadId) {
        self.slots.write().remove(&id);
        debug!("Released download {}", id);
    }
}

/// Owner of a registered slot; tears the slot down on drop
#[derive(Debug)]
pub struct SlotGuard {
    registry: Registry,
    id: DownloadId,
    slot: Arc<DownloadSlot>,
}

impl SlotGuard {
    pub fn id(&self) -> DownloadId {
        self.id
    }

    pub fn slot(&self) -> Arc<DownloadSlot> {
        self.slot.clone()
    }
}

impl Deref for SlotGuard {
    type Target = DownloadSlot;

    fn deref(&self) -> &DownloadSlot {
        &self.slot
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
