//! # Memory Management
//!
//! Pre-allocated storage for the hot per-frame path.
//!
//! ## Philosophy
//!
//! Entity ids are bounded by configuration, so lookups index an array
//! instead of hashing.

mod slots;

pub use slots::{SlotArena, SlotError};
