//! Cameras, lights and scenes.

use std::sync::Arc;

use crate::definition::{LightType, Projection, ResourceDefinition, SceneDefinition};
use crate::error::ResourceResult;
use crate::loader::{LoadContext, LoadFuture, Payload, ResourceLoader};

use super::TextureData;

/// Camera parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraData {
    /// Debug name.
    pub name: Option<String>,
    /// Projection.
    pub projection: Projection,
}

/// Loads [`ResourceDefinition::Camera`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraLoader;

impl ResourceLoader for CameraLoader {
    fn load(&self, ctx: LoadContext, definition: ResourceDefinition) -> LoadFuture {
        let def = super::expect_definition!(ctx, definition, Camera);
        let valid = match def.projection {
            Projection::Perspective { yfov, znear, zfar, .. } => {
                yfov > 0.0 && znear > 0.0 && zfar.map_or(true, |far| far > znear)
            }
            Projection::Orthographic { znear, zfar, .. } => zfar > znear,
        };
        let result: ResourceResult<Payload> = if valid {
            Ok(Arc::new(CameraData {
                name: def.name,
                projection: def.projection,
            }))
        } else {
            Err(ctx.fail("invalid projection planes"))
        };
        Box::pin(async move { result })
    }
}

/// Light parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LightData {
    /// Debug name.
    pub name: Option<String>,
    /// Source.
    pub light: LightType,
}

/// Loads [`ResourceDefinition::Light`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LightLoader;

impl ResourceLoader for LightLoader {
    fn load(&self, ctx: LoadContext, definition: ResourceDefinition) -> LoadFuture {
        let def = super::expect_definition!(ctx, definition, Light);
        let payload: Payload = Arc::new(LightData {
            name: def.name,
            light: def.light,
        });
        Box::pin(async move { Ok(payload) })
    }
}

/// Root of a renderable hierarchy.
#[derive(Debug, Clone)]
pub struct SceneData {
    /// Debug name.
    pub name: Option<String>,
    /// Clear colour.
    pub background_color: Option<[f32; 3]>,
    /// Image-based lighting source.
    pub environment: Option<Arc<TextureData>>,
}

/// Loads [`ResourceDefinition::Scene`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneLoader;

impl ResourceLoader for SceneLoader {
    fn load(&self, ctx: LoadContext, definition: ResourceDefinition) -> LoadFuture {
        let def = super::expect_definition!(ctx, definition, Scene);
        Box::pin(load_scene(ctx, def))
    }
}

async fn load_scene(ctx: LoadContext, def: SceneDefinition) -> ResourceResult<Payload> {
    let environment = match def.environment_texture {
        Some(id) => Some(ctx.resolve_as::<TextureData>(id).await?),
        None => None,
    };
    Ok(Arc::new(SceneData {
        name: def.name,
        background_color: def.background_color,
        environment,
    }))
}
