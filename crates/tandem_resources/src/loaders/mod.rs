//! # Built-in Loaders
//!
//! Headless loaders for every statically known [`ResourceKind`]. They build
//! plain CPU-side data; a render backend uploads it later.
//!
//! | Kind     | Payload          | Depends on                     |
//! |----------|------------------|--------------------------------|
//! | geometry | [`GeometryData`] | -                              |
//! | material | [`MaterialData`] | optional base-colour texture   |
//! | mesh     | [`MeshData`]     | geometry, material             |
//! | texture  | [`TextureData`]  | - (reads a file)               |
//! | camera   | [`CameraData`]   | -                              |
//! | light    | [`LightData`]    | -                              |
//! | scene    | [`SceneData`]    | optional environment texture   |

/// Fails a load whose definition was routed to the wrong loader.
macro_rules! expect_definition {
    ($ctx:expr, $definition:expr, $variant:ident) => {
        match $definition {
            $crate::definition::ResourceDefinition::$variant(d) => d,
            other => {
                let error = $ctx.fail(format!(
                    "{} loader received a {} definition",
                    stringify!($variant),
                    other.kind()
                ));
                return Box::pin(async move { Err(error) });
            }
        }
    };
}
pub(crate) use expect_definition;

mod geometry;
mod mesh;
mod scene;
mod texture;

pub use geometry::{GeometryData, GeometryLoader};
pub use mesh::{MaterialData, MaterialLoader, MeshData, MeshLoader};
pub use scene::{CameraData, CameraLoader, LightData, LightLoader, SceneData, SceneLoader};
pub use texture::{TextureData, TextureLoader};

use std::sync::Arc;

use crate::definition::ResourceKind;
use crate::error::ResourceResult;
use crate::loader::ResourceLoader;
use crate::table::ResourceTable;

/// Registers the built-in loader for every kind that has none yet.
///
/// Kinds with a custom loader keep it.
///
/// # Errors
///
/// Returns [`crate::ResourceError::DuplicateLoader`] if a loader for the
/// same kind is registered concurrently.
pub fn register_builtin_loaders(table: &ResourceTable) -> ResourceResult<()> {
    let builtins: [(ResourceKind, Arc<dyn ResourceLoader>); 7] = [
        (ResourceKind::Geometry, Arc::new(GeometryLoader)),
        (ResourceKind::Material, Arc::new(MaterialLoader)),
        (ResourceKind::Mesh, Arc::new(MeshLoader)),
        (ResourceKind::Texture, Arc::new(TextureLoader)),
        (ResourceKind::Camera, Arc::new(CameraLoader)),
        (ResourceKind::Light, Arc::new(LightLoader)),
        (ResourceKind::Scene, Arc::new(SceneLoader)),
    ];
    for (kind, loader) in builtins {
        if !table.has_loader(kind) {
            table.register_shared_loader(kind, loader)?;
        }
    }
    Ok(())
}
