//! # Tandem Core
//!
//! The byte channel between a fixed-rate simulation and a variable-rate
//! presentation:
//! - `CursorView` encodes primitives with change suppression
//! - `TripleBuffer` rotates three regions without locks
//! - `RenderableSchema` fixes where each entity's fields live
//!
//! ## Architecture Rules
//!
//! 1. **Neither side waits** - staleness is observed, not prevented
//! 2. **Whole ticks only** - a partial tick is never visible to the reader
//! 3. **The schema is the contract** - bytes carry no tags
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_core::{RenderableSchema, RenderableState, TripleBuffer};
//!
//! let schema = RenderableSchema::new(1024);
//! let (mut producer, mut consumer) = TripleBuffer::new(|| schema.create_region());
//!
//! schema.write_entity(producer.write_region(), 3, &RenderableState::default())?;
//! producer.publish();
//!
//! if consumer.swap_for_read() {
//!     let state = schema.read_entity(consumer.read_region(), 3)?;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod cursor;
pub mod math;
pub mod memory;
pub mod schema;
pub mod sync;

/// Entity identifier shared by both contexts.
pub type EntityId = u32;

pub use cursor::{CursorError, CursorReader, CursorResult, CursorView, Primitive, Reserved};
pub use math::{Mat4, Quat, Transform, Vec3};
pub use memory::{SlotArena, SlotError};
pub use schema::{RenderableSchema, RenderableState, SchemaError};
pub use sync::{StalenessCounters, TripleBuffer, TripleBufferConsumer, TripleBufferProducer};
