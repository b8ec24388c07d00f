//! # Synchronization Primitives
//!
//! ## The Problem
//!
//! ```text
//! Simulation:    WRITE entity state every tick (fixed rate)
//! Presentation:  READ entity state every frame (variable rate)
//!
//! With Mutex:        one side stalls the other
//! With Double Buffer: the swap needs both sides to agree
//! ```
//!
//! ## The Solution: Triple Buffering
//!
//! ```text
//! Producer writes  Region W
//! Ready to swap    Region R   (last complete tick)
//! Consumer reads   Region C
//!
//! publish:       W <-> R   (producer never waits)
//! swap_for_read: R <-> C   (consumer never waits)
//! ```
//!
//! Zero locks. Zero waiting. Partial ticks are never visible.

mod triple_buffer;

pub use triple_buffer::{
    StalenessCounters,
    TripleBuffer,
    TripleBufferConsumer,
    TripleBufferProducer,
};
