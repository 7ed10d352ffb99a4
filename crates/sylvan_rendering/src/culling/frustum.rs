//! Frustum planes and the per-frame camera.
//!
//! Extracts frustum planes from the view-projection matrix and tests
//! bounding spheres against them.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::error::{ConfigError, ConfigResult};

/// Planes whose un-normalized normal is shorter than this are degenerate.
const MIN_PLANE_NORMAL: f32 = 1e-6;

/// A plane in 3D space (Ax + By + Cz + D = 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Plane {
    /// Normal X component.
    pub a: f32,
    /// Normal Y component.
    pub b: f32,
    /// Normal Z component.
    pub c: f32,
    /// Distance from origin.
    pub d: f32,
}

impl Plane {
    /// Creates a new plane.
    #[must_use]
    pub const fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self { a, b, c, d }
    }

    /// Length of the normal.
    #[inline]
    #[must_use]
    pub fn normal_length(&self) -> f32 {
        (self.a * self.a + self.b * self.b + self.c * self.c).sqrt()
    }

    /// Normalizes the plane.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = self.normal_length();
        if len > 0.0 {
            Self {
                a: self.a / len,
                b: self.b / len,
                c: self.c / len,
                d: self.d / len,
            }
        } else {
            self
        }
    }

    /// Returns the signed distance from a point to the plane.
    #[inline]
    #[must_use]
    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        self.a * p.x + self.b * p.y + self.c * p.z + self.d
    }

    /// Converts to array format.
    #[must_use]
    pub const fn as_array(&self) -> [f32; 4] {
        [self.a, self.b, self.c, self.d]
    }
}

/// View frustum, normals pointing inward.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far planes.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Left plane index.
    pub const LEFT: usize = 0;
    /// Right plane index.
    pub const RIGHT: usize = 1;
    /// Bottom plane index.
    pub const BOTTOM: usize = 2;
    /// Top plane index.
    pub const TOP: usize = 3;
    /// Near plane index.
    pub const NEAR: usize = 4;
    /// Far plane index.
    pub const FAR: usize = 5;

    /// Extracts frustum planes from a view-projection matrix.
    ///
    /// The matrix is column-major with a [0, 1] depth range (WGPU convention).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DegenerateFrustum`] if the matrix is not finite
    /// or any plane has a vanishing normal.
    pub fn from_view_projection(view_proj: &Mat4) -> ConfigResult<Self> {
        if !view_proj.is_finite() {
            return Err(ConfigError::DegenerateFrustum("view-projection is not finite"));
        }
        let m = view_proj.to_cols_array_2d();

        let raw = [
            // Left plane: row3 + row0
            Plane::new(
                m[0][3] + m[0][0],
                m[1][3] + m[1][0],
                m[2][3] + m[2][0],
                m[3][3] + m[3][0],
            ),
            // Right plane: row3 - row0
            Plane::new(
                m[0][3] - m[0][0],
                m[1][3] - m[1][0],
                m[2][3] - m[2][0],
                m[3][3] - m[3][0],
            ),
            // Bottom plane: row3 + row1
            Plane::new(
                m[0][3] + m[0][1],
                m[1][3] + m[1][1],
                m[2][3] + m[2][1],
                m[3][3] + m[3][1],
            ),
            // Top plane: row3 - row1
            Plane::new(
                m[0][3] - m[0][1],
                m[1][3] - m[1][1],
                m[2][3] - m[2][1],
                m[3][3] - m[3][1],
            ),
            // Near plane: row2 (depth 0)
            Plane::new(m[0][2], m[1][2], m[2][2], m[3][2]),
            // Far plane: row3 - row2
            Plane::new(
                m[0][3] - m[0][2],
                m[1][3] - m[1][2],
                m[2][3] - m[2][2],
                m[3][3] - m[3][2],
            ),
        ];

        let mut planes = [Plane::default(); 6];
        for (out, plane) in planes.iter_mut().zip(raw) {
            if !(plane.normal_length() > MIN_PLANE_NORMAL) {
                return Err(ConfigError::DegenerateFrustum("plane normal vanishes"));
            }
            *out = plane.normalized();
        }
        Ok(Self { planes })
    }

    /// Tests if a sphere intersects the frustum (conservative).
    #[inline]
    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(center) >= -radius)
    }

    /// Converts planes to array format for GPU upload.
    #[must_use]
    pub fn as_arrays(&self) -> [[f32; 4]; 6] {
        self.planes.map(|plane| plane.as_array())
    }
}

/// Camera state consumed by the passes, fixed for the duration of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Eye position in world space.
    pub position: Vec3,
    /// Combined view-projection matrix.
    pub view_proj: Mat4,
    /// Planes extracted from `view_proj`.
    pub frustum: Frustum,
}

impl Camera {
    /// Creates a camera from an eye position and a view-projection matrix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DegenerateFrustum`] for a non-finite position or
    /// an unusable matrix.
    pub fn new(position: Vec3, view_proj: Mat4) -> ConfigResult<Self> {
        if !position.is_finite() {
            return Err(ConfigError::DegenerateFrustum("camera position is not finite"));
        }
        Ok(Self {
            position,
            view_proj,
            frustum: Frustum::from_view_projection(&view_proj)?,
        })
    }

    /// Builds a right-handed perspective camera looking at `target`.
    ///
    /// # Arguments
    ///
    /// * `fov_y` - Vertical field of view in radians
    /// * `aspect` - Width over height
    /// * `near`, `far` - Clip distances, `0 < near < far`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DegenerateFrustum`] for invalid projection
    /// parameters or when `up` is parallel to the view direction.
    #[allow(clippy::too_many_arguments)]
    pub fn look_at(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> ConfigResult<Self> {
        if !(fov_y > 0.0 && fov_y < std::f32::consts::PI) {
            return Err(ConfigError::DegenerateFrustum("fov_y outside (0, pi)"));
        }
        if !(aspect > 0.0 && near > 0.0 && far > near) {
            return Err(ConfigError::DegenerateFrustum("need aspect > 0 and 0 < near < far"));
        }
        let forward = target - position;
        if forward.length_squared() <= f32::EPSILON
            || forward.normalize().cross(up.normalize_or_zero()).length_squared() <= f32::EPSILON
        {
            return Err(ConfigError::DegenerateFrustum("up is parallel to view direction"));
        }

        let view = Mat4::look_at_rh(position, target, up);
        let proj = Mat4::perspective_rh(fov_y, aspect, near, far);
        Self::new(position, proj * view)
    }
}
