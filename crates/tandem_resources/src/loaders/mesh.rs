//! Materials and meshes. Both resolve their dependencies through the table
//! before producing a payload.

use std::sync::Arc;

use crate::definition::{MaterialDefinition, MaterialType, MeshDefinition, ResourceDefinition};
use crate::error::ResourceResult;
use crate::loader::{LoadContext, LoadFuture, Payload, ResourceLoader};

use super::{GeometryData, TextureData};

/// Surface parameters with resolved texture.
#[derive(Debug, Clone)]
pub struct MaterialData {
    /// Debug name.
    pub name: Option<String>,
    /// Shading model.
    pub material_type: MaterialType,
    /// Linear RGBA.
    pub base_color: [f32; 4],
    /// Clamped to [0, 1].
    pub roughness: f32,
    /// Clamped to [0, 1].
    pub metallic: f32,
    /// Base-colour texture, if any.
    pub base_color_texture: Option<Arc<TextureData>>,
}

/// Loads [`ResourceDefinition::Material`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialLoader;

impl ResourceLoader for MaterialLoader {
    fn load(&self, ctx: LoadContext, definition: ResourceDefinition) -> LoadFuture {
        let def = super::expect_definition!(ctx, definition, Material);
        Box::pin(load_material(ctx, def))
    }
}

async fn load_material(ctx: LoadContext, def: MaterialDefinition) -> ResourceResult<Payload> {
    let base_color_texture = match def.base_color_texture {
        Some(id) => Some(ctx.resolve_as::<TextureData>(id).await?),
        None => None,
    };
    Ok(Arc::new(MaterialData {
        name: def.name,
        material_type: def.material_type,
        base_color: def.base_color_factor,
        roughness: def.roughness_factor.clamp(0.0, 1.0),
        metallic: def.metallic_factor.clamp(0.0, 1.0),
        base_color_texture,
    }))
}

/// Geometry bound to a material.
#[derive(Debug, Clone)]
pub struct MeshData {
    /// Debug name.
    pub name: Option<String>,
    /// Vertex data.
    pub geometry: Arc<GeometryData>,
    /// Surface.
    pub material: Arc<MaterialData>,
    /// Casts shadows.
    pub cast_shadow: bool,
    /// Receives shadows.
    pub receive_shadow: bool,
}

/// Loads [`ResourceDefinition::Mesh`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshLoader;

impl ResourceLoader for MeshLoader {
    fn load(&self, ctx: LoadContext, definition: ResourceDefinition) -> LoadFuture {
        let def = super::expect_definition!(ctx, definition, Mesh);
        Box::pin(load_mesh(ctx, def))
    }
}

async fn load_mesh(ctx: LoadContext, def: MeshDefinition) -> ResourceResult<Payload> {
    let geometry = ctx.resolve_as::<GeometryData>(def.geometry).await?;
    let material = ctx.resolve_as::<MaterialData>(def.material).await?;
    Ok(Arc::new(MeshData {
        name: def.name,
        geometry,
        material,
        cast_shadow: def.cast_shadow,
        receive_shadow: def.receive_shadow,
    }))
}
