//! Procedural geometry.

use std::sync::Arc;

use crate::definition::{GeometryDefinition, GeometryShape, ResourceDefinition};
use crate::error::ResourceResult;
use crate::loader::{LoadContext, LoadFuture, Payload, ResourceLoader};

/// Indexed triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryData {
    /// Debug name.
    pub name: Option<String>,
    /// Vertex positions.
    pub positions: Vec<[f32; 3]>,
    /// Vertex normals.
    pub normals: Vec<[f32; 3]>,
    /// Texture coordinates.
    pub uvs: Vec<[f32; 2]>,
    /// Triangle indices, counter-clockwise.
    pub indices: Vec<u32>,
}

impl GeometryData {
    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Builds `shape`.
    ///
    /// # Errors
    ///
    /// Fails if a dimension is not finite and positive.
    pub fn generate(shape: &GeometryShape) -> Result<Self, String> {
        let mut data = Self::default();
        match *shape {
            GeometryShape::Box {
                width,
                height,
                depth,
                width_segments,
                height_segments,
                depth_segments,
            } => {
                check_extent("width", width)?;
                check_extent("height", height)?;
                check_extent("depth", depth)?;
                let (ws, hs, ds) = (width_segments.max(1), height_segments.max(1), depth_segments.max(1));

                // Faces: +X, -X, +Y, -Y, +Z, -Z
                data.plane(Face::new([2, 1, 0], [-1.0, -1.0]), [depth, height, width], [ds, hs]);
                data.plane(Face::new([2, 1, 0], [1.0, -1.0]), [depth, height, -width], [ds, hs]);
                data.plane(Face::new([0, 2, 1], [1.0, 1.0]), [width, depth, height], [ws, ds]);
                data.plane(Face::new([0, 2, 1], [1.0, -1.0]), [width, depth, -height], [ws, ds]);
                data.plane(Face::new([0, 1, 2], [1.0, -1.0]), [width, height, depth], [ws, hs]);
                data.plane(Face::new([0, 1, 2], [-1.0, -1.0]), [width, height, -depth], [ws, hs]);
            }
            GeometryShape::Plane { width, height } => {
                check_extent("width", width)?;
                check_extent("height", height)?;
                let mut face = Face::new([0, 1, 2], [1.0, -1.0]);
                face.normal_sign = 1.0;
                data.plane(face, [width, height, 0.0], [1, 1]);
            }
        }
        Ok(data)
    }

    fn plane(&mut self, face: Face, [width, height, depth]: [f32; 3], [grid_x, grid_y]: [u32; 2]) {
        let [u, v, w] = face.axes;
        let [u_dir, v_dir] = face.dirs;
        let normal_sign = if face.normal_sign == 0.0 {
            depth.signum()
        } else {
            face.normal_sign
        };

        let segment_width = width / grid_x as f32;
        let segment_height = height / grid_y as f32;
        let base = u32::try_from(self.positions.len()).unwrap_or(u32::MAX);

        for iy in 0..=grid_y {
            let y = iy as f32 * segment_height - height / 2.0;
            for ix in 0..=grid_x {
                let x = ix as f32 * segment_width - width / 2.0;

                let mut position = [0.0; 3];
                position[u] = x * u_dir;
                position[v] = y * v_dir;
                position[w] = depth / 2.0;
                self.positions.push(position);

                let mut normal = [0.0; 3];
                normal[w] = normal_sign;
                self.normals.push(normal);

                self.uvs
                    .push([ix as f32 / grid_x as f32, 1.0 - iy as f32 / grid_y as f32]);
            }
        }

        let row = grid_x + 1;
        for iy in 0..grid_y {
            for ix in 0..grid_x {
                let a = base + ix + row * iy;
                let b = base + ix + row * (iy + 1);
                let c = base + (ix + 1) + row * (iy + 1);
                let d = base + (ix + 1) + row * iy;
                self.indices.extend_from_slice(&[a, b, d, b, c, d]);
            }
        }
    }
}

struct Face {
    axes: [usize; 3],
    dirs: [f32; 2],
    /// 0 = derive from the offset's sign.
    normal_sign: f32,
}

impl Face {
    const fn new(axes: [usize; 3], dirs: [f32; 2]) -> Self {
        Self {
            axes,
            dirs,
            normal_sign: 0.0,
        }
    }
}

fn check_extent(name: &str, value: f32) -> Result<(), String> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(format!("{name} must be finite and positive, got {value}"))
    }
}

/// Loads [`ResourceDefinition::Geometry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometryLoader;

impl ResourceLoader for GeometryLoader {
    fn load(&self, ctx: LoadContext, definition: ResourceDefinition) -> LoadFuture {
        let def = super::expect_definition!(ctx, definition, Geometry);
        Box::pin(load_geometry(ctx, def))
    }
}

async fn load_geometry(ctx: LoadContext, def: GeometryDefinition) -> ResourceResult<Payload> {
    let mut data = GeometryData::generate(&def.shape).map_err(|reason| ctx.fail(reason))?;
    data.name = def.name;
    Ok(Arc::new(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_box_counts() {
        let data = GeometryData::generate(&GeometryShape::unit_box()).unwrap();
        // 6 faces × 4 vertices, 6 faces × 2 triangles
        assert_eq!(data.positions.len(), 24);
        assert_eq!(data.normals.len(), 24);
        assert_eq!(data.uvs.len(), 24);
        assert_eq!(data.triangle_count(), 12);
        assert!(data.indices.iter().all(|&i| (i as usize) < data.positions.len()));
    }

    #[test]
    fn test_box_vertices_on_surface() {
        let shape = GeometryShape::Box {
            width: 2.0,
            height: 4.0,
            depth: 6.0,
            width_segments: 2,
            height_segments: 3,
            depth_segments: 1,
        };
        let data = GeometryData::generate(&shape).unwrap();
        for p in &data.positions {
            assert!(p[0].abs() <= 1.0 + 1e-6);
            assert!(p[1].abs() <= 2.0 + 1e-6);
            assert!(p[2].abs() <= 3.0 + 1e-6);
        }
        // Every normal is a unit axis pointing outward
        for (p, n) in data.positions.iter().zip(&data.normals) {
            let axis = n.iter().position(|c| *c != 0.0).unwrap();
            assert_eq!(n[axis].abs(), 1.0);
            assert!(p[axis] * n[axis] > 0.0);
        }
    }

    #[test]
    fn test_plane_faces_positive_z() {
        let data = GeometryData::generate(&GeometryShape::Plane { width: 2.0, height: 1.0 }).unwrap();
        assert_eq!(data.positions.len(), 4);
        assert_eq!(data.triangle_count(), 2);
        assert!(data.normals.iter().all(|n| *n == [0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_rejects_degenerate_extent() {
        let shape = GeometryShape::Box {
            width: 0.0,
            height: 1.0,
            depth: 1.0,
            width_segments: 1,
            height_segments: 1,
            depth_segments: 1,
        };
        assert!(GeometryData::generate(&shape).is_err());
        assert!(GeometryData::generate(&GeometryShape::Plane {
            width: f32::NAN,
            height: 1.0
        })
        .is_err());
    }
}
