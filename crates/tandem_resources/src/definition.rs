//! # Resource Definitions
//!
//! Plain-data descriptions of what to load. A definition is the only thing
//! that crosses the context boundary for a resource; payloads never do.
//!
//! Two definitions describe the same resource exactly when their canonical
//! JSON encodings are equal. That string is the de-duplication key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, ResourceResult};
use crate::ResourceId;

/// Category of a resource. Selects the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Vertex data.
    Geometry,
    /// Surface parameters.
    Material,
    /// Geometry bound to a material.
    Mesh,
    /// Image data.
    Texture,
    /// Projection parameters.
    Camera,
    /// Light source.
    Light,
    /// Root of a renderable hierarchy.
    Scene,
}

impl ResourceKind {
    /// Every kind, in registration order.
    pub const ALL: [Self; 7] = [
        Self::Geometry,
        Self::Material,
        Self::Mesh,
        Self::Texture,
        Self::Camera,
        Self::Light,
        Self::Scene,
    ];

    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Geometry => "geometry",
            Self::Material => "material",
            Self::Mesh => "mesh",
            Self::Texture => "texture",
            Self::Camera => "camera",
            Self::Light => "light",
            Self::Scene => "scene",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a generated geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum GeometryShape {
    /// Axis-aligned box centred on the origin.
    Box {
        /// Extent along X.
        width: f32,
        /// Extent along Y.
        height: f32,
        /// Extent along Z.
        depth: f32,
        /// Subdivisions along X.
        width_segments: u32,
        /// Subdivisions along Y.
        height_segments: u32,
        /// Subdivisions along Z.
        depth_segments: u32,
    },
    /// Plane in XY facing +Z.
    Plane {
        /// Extent along X.
        width: f32,
        /// Extent along Y.
        height: f32,
    },
}

impl GeometryShape {
    /// Unit cube with one segment per side.
    #[must_use]
    pub const fn unit_box() -> Self {
        Self::Box {
            width: 1.0,
            height: 1.0,
            depth: 1.0,
            width_segments: 1,
            height_segments: 1,
            depth_segments: 1,
        }
    }
}

/// Geometry definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryDefinition {
    /// Optional debug name.
    #[serde(default)]
    pub name: Option<String>,
    /// What to generate.
    pub shape: GeometryShape,
}

/// Shading model of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialType {
    /// Unlit colour.
    Basic,
    /// Metallic-roughness.
    Physical,
}

/// Material definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDefinition {
    /// Optional debug name.
    #[serde(default)]
    pub name: Option<String>,
    /// Shading model.
    pub material_type: MaterialType,
    /// Linear RGBA.
    pub base_color_factor: [f32; 4],
    /// 0 = mirror, 1 = fully rough.
    pub roughness_factor: f32,
    /// 0 = dielectric, 1 = metal.
    pub metallic_factor: f32,
    /// Optional texture resource.
    #[serde(default)]
    pub base_color_texture: Option<ResourceId>,
}

impl Default for MaterialDefinition {
    fn default() -> Self {
        Self {
            name: None,
            material_type: MaterialType::Physical,
            base_color_factor: [1.0; 4],
            roughness_factor: 1.0,
            metallic_factor: 1.0,
            base_color_texture: None,
        }
    }
}

/// Mesh definition. Depends on a geometry and a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshDefinition {
    /// Optional debug name.
    #[serde(default)]
    pub name: Option<String>,
    /// Geometry resource.
    pub geometry: ResourceId,
    /// Material resource.
    pub material: ResourceId,
    /// Casts shadows.
    #[serde(default)]
    pub cast_shadow: bool,
    /// Receives shadows.
    #[serde(default)]
    pub receive_shadow: bool,
}

/// Encoding of a texture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureType {
    /// Radiance HDR.
    Rgbe,
    /// Uninterpreted bytes.
    Raw,
}

/// Texture definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureDefinition {
    /// Optional debug name.
    #[serde(default)]
    pub name: Option<String>,
    /// File encoding.
    pub texture_type: TextureType,
    /// Path of the file to read.
    pub url: String,
}

/// Camera projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "projection", rename_all = "snake_case")]
pub enum Projection {
    /// Perspective projection.
    Perspective {
        /// Vertical field of view in radians.
        yfov: f32,
        /// Width / height. `None` follows the canvas.
        #[serde(default)]
        aspect_ratio: Option<f32>,
        /// Near plane.
        znear: f32,
        /// Far plane. `None` is infinite.
        #[serde(default)]
        zfar: Option<f32>,
    },
    /// Orthographic projection.
    Orthographic {
        /// Half width.
        xmag: f32,
        /// Half height.
        ymag: f32,
        /// Near plane.
        znear: f32,
        /// Far plane.
        zfar: f32,
    },
}

/// Camera definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDefinition {
    /// Optional debug name.
    #[serde(default)]
    pub name: Option<String>,
    /// Projection parameters.
    pub projection: Projection,
}

/// Light source parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "light_type", rename_all = "snake_case")]
pub enum LightType {
    /// Parallel rays along the node's -Z.
    Directional {
        /// Linear RGB.
        color: [f32; 3],
        /// Illuminance scale.
        intensity: f32,
        /// Casts shadows.
        cast_shadow: bool,
    },
    /// Omnidirectional point light.
    Point {
        /// Linear RGB.
        color: [f32; 3],
        /// Intensity scale.
        intensity: f32,
        /// Cut-off distance. `None` is unbounded.
        range: Option<f32>,
    },
    /// Uniform fill light.
    Ambient {
        /// Linear RGB.
        color: [f32; 3],
        /// Intensity scale.
        intensity: f32,
    },
}

/// Light definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightDefinition {
    /// Optional debug name.
    #[serde(default)]
    pub name: Option<String>,
    /// Source parameters.
    pub light: LightType,
}

/// Scene definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SceneDefinition {
    /// Optional debug name.
    #[serde(default)]
    pub name: Option<String>,
    /// Clear colour, linear RGB.
    #[serde(default)]
    pub background_color: Option<[f32; 3]>,
    /// Texture resource used for image-based lighting.
    #[serde(default)]
    pub environment_texture: Option<ResourceId>,
}

/// Serializable description of a resource to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceDefinition {
    /// See [`GeometryDefinition`].
    Geometry(GeometryDefinition),
    /// See [`MaterialDefinition`].
    Material(MaterialDefinition),
    /// See [`MeshDefinition`].
    Mesh(MeshDefinition),
    /// See [`TextureDefinition`].
    Texture(TextureDefinition),
    /// See [`CameraDefinition`].
    Camera(CameraDefinition),
    /// See [`LightDefinition`].
    Light(LightDefinition),
    /// See [`SceneDefinition`].
    Scene(SceneDefinition),
}

impl ResourceDefinition {
    /// The kind that selects this definition's loader.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Geometry(_) => ResourceKind::Geometry,
            Self::Material(_) => ResourceKind::Material,
            Self::Mesh(_) => ResourceKind::Mesh,
            Self::Texture(_) => ResourceKind::Texture,
            Self::Camera(_) => ResourceKind::Camera,
            Self::Light(_) => ResourceKind::Light,
            Self::Scene(_) => ResourceKind::Scene,
        }
    }

    /// Debug name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Geometry(d) => d.name.as_deref(),
            Self::Material(d) => d.name.as_deref(),
            Self::Mesh(d) => d.name.as_deref(),
            Self::Texture(d) => d.name.as_deref(),
            Self::Camera(d) => d.name.as_deref(),
            Self::Light(d) => d.name.as_deref(),
            Self::Scene(d) => d.name.as_deref(),
        }
    }

    /// Resources this definition refers to.
    #[must_use]
    pub fn dependencies(&self) -> Vec<ResourceId> {
        match self {
            Self::Mesh(d) => vec![d.geometry, d.material],
            Self::Material(d) => d.base_color_texture.into_iter().collect(),
            Self::Scene(d) => d.environment_texture.into_iter().collect(),
            Self::Geometry(_) | Self::Texture(_) | Self::Camera(_) | Self::Light(_) => Vec::new(),
        }
    }

    /// Canonical JSON encoding. Equal keys mean the same resource.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Encoding`] if serialization fails.
    pub fn canonical_key(&self) -> ResourceResult<String> {
        serde_json::to_string(self).map_err(|e| ResourceError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_definitions_share_a_key() {
        let a = ResourceDefinition::Geometry(GeometryDefinition {
            name: None,
            shape: GeometryShape::unit_box(),
        });
        let b = a.clone();
        assert_eq!(a.canonical_key().unwrap(), b.canonical_key().unwrap());

        let c = ResourceDefinition::Geometry(GeometryDefinition {
            name: Some("crate".into()),
            shape: GeometryShape::unit_box(),
        });
        assert_ne!(a.canonical_key().unwrap(), c.canonical_key().unwrap());
    }

    #[test]
    fn test_kind_and_dependencies() {
        let mesh = ResourceDefinition::Mesh(MeshDefinition {
            name: None,
            geometry: 4,
            material: 9,
            cast_shadow: true,
            receive_shadow: false,
        });
        assert_eq!(mesh.kind(), ResourceKind::Mesh);
        assert_eq!(mesh.dependencies(), vec![4, 9]);

        let scene = ResourceDefinition::Scene(SceneDefinition::default());
        assert!(scene.dependencies().is_empty());
    }

    #[test]
    fn test_json_shape_is_tagged() {
        let json = r#"{"type":"texture","texture_type":"rgbe","url":"sky.hdr"}"#;
        let parsed: ResourceDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.kind(), ResourceKind::Texture);

        let unknown = r#"{"type":"hologram"}"#;
        assert!(serde_json::from_str::<ResourceDefinition>(unknown).is_err());
    }
}
