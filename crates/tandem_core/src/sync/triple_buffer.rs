//! # Triple Buffer
//!
//! Lock-free single-producer/single-consumer region rotation.
//!
//! ## Safety Note
//!
//! This module requires unsafe code to hand out `&mut T` / `&T` into
//! regions owned by different threads. Exclusivity comes from the role
//! protocol below, never from a lock.

#![allow(unsafe_code)]
//!
//! ## Architecture
//!
//! ```text
//!   Producer (simulation)            Consumer (presentation)
//!   ┌──────────────┐                 ┌──────────────┐
//!   │ write_idx    │                 │ read_idx     │
//!   └──────┬───────┘                 └──────┬───────┘
//!          │ publish: swap(write|FRESH)     │ swap_for_read: swap(read)
//!          ▼                                ▼
//!   ┌─────────────────────────────────────────────────┐
//!   │ state: AtomicU8  = ready index (2 bits) | FRESH │
//!   └─────────────────────────────────────────────────┘
//!          Region 0        Region 1        Region 2
//! ```
//!
//! Each side keeps its own index privately. The only shared mutation is the
//! swap of the ready slot, so the producer can never hold the region being
//! read and the consumer can never hold the region being written. A tick's
//! writes become visible all at once, at the swap.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Set in `state` when the ready region holds a tick the consumer has not taken.
const FRESH: u8 = 0b100;
/// Low two bits of `state`: index of the ready region.
const INDEX_MASK: u8 = 0b011;

/// Shared half of a triple buffer. Only reachable through the two handles.
pub struct TripleBuffer<T> {
    regions: [UnsafeCell<T>; 3],
    state: AtomicU8,
    published: AtomicU64,
    overwritten: AtomicU64,
}

// SAFETY: regions are only accessed through the producer/consumer handles,
// and the role protocol guarantees no region is shared between them.
unsafe impl<T: Send> Sync for TripleBuffer<T> {}

impl<T> TripleBuffer<T> {
    /// Creates a triple buffer, building each region with `init`.
    ///
    /// Region 0 starts as *writing*, 1 as *ready* (not fresh), 2 as *reading*.
    #[must_use]
    pub fn new(mut init: impl FnMut() -> T) -> (TripleBufferProducer<T>, TripleBufferConsumer<T>) {
        let shared = Arc::new(Self {
            regions: [
                UnsafeCell::new(init()),
                UnsafeCell::new(init()),
                UnsafeCell::new(init()),
            ],
            state: AtomicU8::new(1),
            published: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
        });

        let producer = TripleBufferProducer {
            shared: Arc::clone(&shared),
            write_idx: 0,
        };
        let consumer = TripleBufferConsumer {
            shared,
            read_idx: 2,
            staleness: StalenessCounters::default(),
        };
        (producer, consumer)
    }

    /// Ticks published so far.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Ticks that were replaced in the ready slot before the consumer took them.
    #[must_use]
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    /// Returns true if a published tick is waiting for the consumer.
    #[must_use]
    pub fn has_fresh(&self) -> bool {
        self.state.load(Ordering::Acquire) & FRESH != 0
    }
}

/// Producer handle. Owns the *writing* region.
///
/// Not `Clone`: there is exactly one producer per buffer.
pub struct TripleBufferProducer<T> {
    shared: Arc<TripleBuffer<T>>,
    write_idx: u8,
}

impl<T> TripleBufferProducer<T> {
    /// The region currently tagged *writing*. Stable until [`Self::publish`].
    #[inline]
    pub fn write_region(&mut self) -> &mut T {
        // SAFETY: `write_idx` is never the ready or reading index, and only
        // this handle knows it. `&mut self` prevents aliasing here.
        unsafe { &mut *self.shared.regions[usize::from(self.write_idx)].get() }
    }

    /// Physical index of the writing region (diagnostics only).
    #[inline]
    #[must_use]
    pub fn write_index(&self) -> usize {
        usize::from(self.write_idx)
    }

    /// Marks the writing region *ready* and takes the previous ready region
    /// as the next one to write.
    ///
    /// Never waits for the consumer. If the previous ready tick was never
    /// taken it is dropped and counted in [`TripleBuffer::overwritten`].
    pub fn publish(&mut self) {
        let prev = self
            .shared
            .state
            .swap(self.write_idx | FRESH, Ordering::AcqRel);
        if prev & FRESH != 0 {
            self.shared.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.write_idx = prev & INDEX_MASK;
        self.shared.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Shared counters.
    #[must_use]
    pub fn shared(&self) -> &TripleBuffer<T> {
        &self.shared
    }
}

/// Staleness accounting on the consumer side. Diagnostic only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StalenessCounters {
    /// Successful swaps.
    pub swaps: u64,
    /// Frames in a row that found nothing new.
    pub consecutive_stale: u32,
    /// Times a new tick arrived after more than one stale frame.
    pub stale_frames: u64,
}

/// Consumer handle. Owns the *reading* region.
///
/// Not `Clone`: there is exactly one consumer per buffer.
pub struct TripleBufferConsumer<T> {
    shared: Arc<TripleBuffer<T>>,
    read_idx: u8,
    staleness: StalenessCounters,
}

impl<T> TripleBufferConsumer<T> {
    /// Promotes the ready region to *reading* if it holds a fresh tick.
    ///
    /// Returns whether a new region became available. The old reading
    /// region goes back to the producer's pool.
    pub fn swap_for_read(&mut self) -> bool {
        // Only the consumer clears FRESH, so it cannot vanish between the
        // load and the swap.
        if self.shared.state.load(Ordering::Acquire) & FRESH == 0 {
            self.staleness.consecutive_stale = self.staleness.consecutive_stale.saturating_add(1);
            return false;
        }

        let prev = self.shared.state.swap(self.read_idx, Ordering::AcqRel);
        self.read_idx = prev & INDEX_MASK;

        if self.staleness.consecutive_stale > 1 {
            self.staleness.stale_frames += 1;
        }
        self.staleness.consecutive_stale = 0;
        self.staleness.swaps += 1;
        true
    }

    /// The region currently tagged *reading*. Stable until the next swap.
    #[inline]
    #[must_use]
    pub fn read_region(&self) -> &T {
        // SAFETY: `read_idx` is never the ready or writing index, and the
        // producer only ever writes its own index.
        unsafe { &*self.shared.regions[usize::from(self.read_idx)].get() }
    }

    /// Physical index of the reading region (diagnostics only).
    #[inline]
    #[must_use]
    pub fn read_index(&self) -> usize {
        usize::from(self.read_idx)
    }

    /// Staleness counters.
    #[inline]
    #[must_use]
    pub const fn staleness(&self) -> StalenessCounters {
        self.staleness
    }

    /// Shared counters.
    #[must_use]
    pub fn shared(&self) -> &TripleBuffer<T> {
        &self.shared
    }
}
