//! # Tandem Resources
//!
//! Reference-counted resource table for the presentation context.
//!
//! The simulation side only ever sees resource ids and definitions. The
//! presentation side owns a [`ResourceTable`] that maps each id to a record
//! holding the load state, the payload once loaded, and a refcount.
//!
//! ## Architecture Rules
//!
//! 1. **One load per id** - concurrent requests share one [`PendingLoad`]
//! 2. **Failures are data** - a failed load becomes the `Error` state
//! 3. **Zero refs evicts** - exactly once, deferred while still loading
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_resources::{register_builtin_loaders, ResourceIdAllocator, ResourceTable};
//!
//! let table = ResourceTable::new(ResourceIdAllocator::new(), runtime.handle().clone());
//! register_builtin_loaders(&table)?;
//!
//! let id = table.request_load(definition)?;
//! table.pending(id).map(|p| p.on_resolve(|outcome| { /* bind */ }));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
// Geometry generation converts small counts to f32
#![allow(clippy::cast_precision_loss)]

pub mod allocator;
pub mod definition;
pub mod error;
pub mod loader;
pub mod loaders;
pub mod pending;
pub mod table;

/// Identifier of a resource. 0 means "no resource".
pub type ResourceId = u32;

pub use allocator::ResourceIdAllocator;
pub use definition::{
    CameraDefinition, GeometryDefinition, GeometryShape, LightDefinition, LightType, MaterialDefinition,
    MaterialType, MeshDefinition, Projection, ResourceDefinition, ResourceKind, SceneDefinition,
    TextureDefinition, TextureType,
};
pub use error::{ResourceError, ResourceResult};
pub use loader::{LoadContext, LoadFuture, LoaderRegistry, Payload, ResourceLoader};
pub use loaders::register_builtin_loaders;
pub use pending::{LoadOutcome, PendingLoad};
pub use table::{ResourceRecord, ResourceState, ResourceTable, TableStats};
