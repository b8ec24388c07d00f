//! # Resource Id Allocation
//!
//! One allocator is shared by both contexts so an id minted on the
//! simulation side is never minted again by the presentation side. Id 0 is
//! reserved for "no resource" and is never handed out.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{ResourceError, ResourceResult};
use crate::ResourceId;

/// Hands out unique, non-zero resource ids. Evicted ids are recycled.
///
/// Cloning shares the same id space.
#[derive(Debug, Clone)]
pub struct ResourceIdAllocator {
    next: Arc<AtomicU32>,
    free_tx: Sender<ResourceId>,
    free_rx: Receiver<ResourceId>,
}

impl ResourceIdAllocator {
    /// Creates an allocator whose first id is 1.
    #[must_use]
    pub fn new() -> Self {
        let (free_tx, free_rx) = unbounded();
        Self {
            next: Arc::new(AtomicU32::new(1)),
            free_tx,
            free_rx,
        }
    }

    /// Returns a recycled id if one is free, otherwise a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Exhausted`] once every `u32` has been used.
    pub fn allocate(&self) -> ResourceResult<ResourceId> {
        if let Ok(id) = self.free_rx.try_recv() {
            return Ok(id);
        }
        self.next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .map_err(|_| ResourceError::Exhausted)
    }

    /// Returns `id` to the free list.
    pub fn release(&self, id: ResourceId) {
        if id != 0 {
            // Both ends live in `self`, so the channel cannot be disconnected
            let _ = self.free_tx.send(id);
        }
    }

    /// Ids waiting for reuse.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_rx.len()
    }
}

impl Default for ResourceIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
