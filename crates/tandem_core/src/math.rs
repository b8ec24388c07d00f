//! Transform math shared by both contexts.
//!
//! Matrices are column-major, translation in elements 12..15. These are the
//! canonical representations written into the state channel.

use bytemuck::{Pod, Zeroable};

/// 3D Vector - position, scale
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// All ones
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Linear blend toward `target` by `alpha`.
    #[must_use]
    pub fn lerp(self, target: Self, alpha: f32) -> Self {
        Self::new(
            self.x + (target.x - self.x) * alpha,
            self.y + (target.y - self.y) * alpha,
            self.z + (target.z - self.z) * alpha,
        )
    }
}

/// Quaternion for rotations
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Quat {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Quat {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Rotation of `angle` radians about the unit `axis`.
    #[must_use]
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    fn normalize(self) -> Self {
        let len = self.dot(self).sqrt();
        if len == 0.0 {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Spherical blend toward `target` by `alpha`, along the short arc.
    #[must_use]
    pub fn slerp(self, target: Self, alpha: f32) -> Self {
        if alpha <= 0.0 {
            return self;
        }
        if alpha >= 1.0 {
            return target;
        }

        let mut cos_half = self.dot(target);
        let mut to = target;
        if cos_half < 0.0 {
            to = Self::new(-to.x, -to.y, -to.z, -to.w);
            cos_half = -cos_half;
        }
        if cos_half >= 1.0 {
            return self;
        }

        let sqr_sin_half = 1.0 - cos_half * cos_half;
        if sqr_sin_half <= f32::EPSILON {
            let s = 1.0 - alpha;
            return Self::new(
                s * self.x + alpha * to.x,
                s * self.y + alpha * to.y,
                s * self.z + alpha * to.z,
                s * self.w + alpha * to.w,
            )
            .normalize();
        }

        let sin_half = sqr_sin_half.sqrt();
        let half = sin_half.atan2(cos_half);
        let ratio_a = ((1.0 - alpha) * half).sin() / sin_half;
        let ratio_b = (alpha * half).sin() / sin_half;
        Self::new(
            self.x * ratio_a + to.x * ratio_b,
            self.y * ratio_a + to.y * ratio_b,
            self.z * ratio_a + to.z * ratio_b,
            self.w * ratio_a + to.w * ratio_b,
        )
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Decomposed transform - position + rotation + scale
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Position
    pub position: Vec3,
    /// Rotation
    pub rotation: Quat,
    /// Scale (per axis)
    pub scale: Vec3,
}

impl Transform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Blends every component toward `target`.
    #[must_use]
    pub fn blend(self, target: Self, alpha: f32) -> Self {
        Self {
            position: self.position.lerp(target.position, alpha),
            rotation: self.rotation.slerp(target.rotation, alpha),
            scale: self.scale.lerp(target.scale, alpha),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// 4x4 column-major matrix
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Mat4 {
    /// Elements, column-major
    pub elements: [f32; 16],
}

impl Mat4 {
    /// Number of floats in a matrix.
    pub const LEN: usize = 16;

    /// Identity matrix
    pub const IDENTITY: Self = Self {
        elements: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    /// Wraps raw column-major elements.
    #[must_use]
    pub const fn from_cols_array(elements: [f32; 16]) -> Self {
        Self { elements }
    }

    /// Pure translation.
    #[must_use]
    pub fn from_translation(t: Vec3) -> Self {
        let mut m = Self::IDENTITY;
        m.elements[12] = t.x;
        m.elements[13] = t.y;
        m.elements[14] = t.z;
        m
    }

    /// Builds a matrix from a decomposed transform.
    #[must_use]
    pub fn compose(t: &Transform) -> Self {
        let Quat { x, y, z, w } = t.rotation;
        let (x2, y2, z2) = (x + x, y + y, z + z);
        let (xx, xy, xz) = (x * x2, x * y2, x * z2);
        let (yy, yz, zz) = (y * y2, y * z2, z * z2);
        let (wx, wy, wz) = (w * x2, w * y2, w * z2);
        let Vec3 { x: sx, y: sy, z: sz } = t.scale;

        Self {
            elements: [
                (1.0 - (yy + zz)) * sx,
                (xy + wz) * sx,
                (xz - wy) * sx,
                0.0,
                (xy - wz) * sy,
                (1.0 - (xx + zz)) * sy,
                (yz + wx) * sy,
                0.0,
                (xz + wy) * sz,
                (yz - wx) * sz,
                (1.0 - (xx + yy)) * sz,
                0.0,
                t.position.x,
                t.position.y,
                t.position.z,
                1.0,
            ],
        }
    }

    /// Splits an affine matrix into position, rotation and scale.
    #[must_use]
    pub fn decompose(&self) -> Transform {
        let e = &self.elements;
        let mut sx = Vec3::new(e[0], e[1], e[2]).length();
        let sy = Vec3::new(e[4], e[5], e[6]).length();
        let sz = Vec3::new(e[8], e[9], e[10]).length();

        // A negative determinant means one axis is mirrored
        let det = e[0] * (e[5] * e[10] - e[9] * e[6]) - e[4] * (e[1] * e[10] - e[9] * e[2])
            + e[8] * (e[1] * e[6] - e[5] * e[2]);
        if det < 0.0 {
            sx = -sx;
        }

        let inv = |s: f32| if s == 0.0 { 0.0 } else { 1.0 / s };
        let (ix, iy, iz) = (inv(sx), inv(sy), inv(sz));
        let (m11, m21, m31) = (e[0] * ix, e[1] * ix, e[2] * ix);
        let (m12, m22, m32) = (e[4] * iy, e[5] * iy, e[6] * iy);
        let (m13, m23, m33) = (e[8] * iz, e[9] * iz, e[10] * iz);

        let trace = m11 + m22 + m33;
        let rotation = if trace > 0.0 {
            let s = 0.5 / (trace + 1.0).sqrt();
            Quat::new((m32 - m23) * s, (m13 - m31) * s, (m21 - m12) * s, 0.25 / s)
        } else if m11 > m22 && m11 > m33 {
            let s = 2.0 * (1.0 + m11 - m22 - m33).sqrt();
            Quat::new(0.25 * s, (m12 + m21) / s, (m13 + m31) / s, (m32 - m23) / s)
        } else if m22 > m33 {
            let s = 2.0 * (1.0 + m22 - m11 - m33).sqrt();
            Quat::new((m12 + m21) / s, 0.25 * s, (m23 + m32) / s, (m13 - m31) / s)
        } else {
            let s = 2.0 * (1.0 + m33 - m11 - m22).sqrt();
            Quat::new((m13 + m31) / s, (m23 + m32) / s, 0.25 * s, (m21 - m12) / s)
        };

        Transform {
            position: Vec3::new(e[12], e[13], e[14]),
            rotation,
            scale: Vec3::new(sx, sy, sz),
        }
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_identity_decomposes_to_identity() {
        let t = Mat4::IDENTITY.decompose();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
    }

    #[test]
    fn test_compose_decompose() {
        let original = Transform {
            position: Vec3::new(1.0, -2.0, 3.5),
            rotation: Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), 0.75),
            scale: Vec3::new(2.0, 2.0, 0.5),
        };
        let back = Mat4::compose(&original).decompose();

        assert!(approx(back.position.x, 1.0));
        assert!(approx(back.position.z, 3.5));
        assert!(approx(back.scale.x, 2.0));
        assert!(approx(back.scale.z, 0.5));
        assert!(approx(back.rotation.y, original.rotation.y));
        assert!(approx(back.rotation.w, original.rotation.w));
    }

    #[test]
    fn test_slerp_endpoints() {
        let a = Quat::IDENTITY;
        let b = Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), 1.0);
        assert_eq!(a.slerp(b, 0.0), a);
        assert_eq!(a.slerp(b, 1.0), b);

        let mid = a.slerp(b, 0.5);
        let expected = Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), 0.5);
        assert!(approx(mid.z, expected.z));
        assert!(approx(mid.w, expected.w));
    }

    #[test]
    fn test_lerp_halfway() {
        let v = Vec3::ZERO.lerp(Vec3::new(2.0, 4.0, -6.0), 0.5);
        assert_eq!(v, Vec3::new(1.0, 2.0, -3.0));
    }

    #[test]
    fn test_mat4_bytemuck() {
        let m = Mat4::IDENTITY;
        let bytes: &[u8] = bytemuck::bytes_of(&m);
        assert_eq!(bytes.len(), 64);
    }
}
