//! Surface query contract and a brute-force triangle surface.
//!
//! The growth rules only ever ask one question of the host mesh: which
//! triangle is closest to a point. Any spatial acceleration structure can
//! answer it through [`SurfaceQuery`]; [`TriangleSurface`] answers it with a
//! linear scan, which is enough for tests and small demo scenes.

use crate::error::{Result, SimError};
use crate::math::{closest_point_on_triangle, triangle_normal};
use glam::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    /// Unit normal following the `a -> b -> c` winding, or `None` for
    /// triangles with no area.
    pub fn normal(&self) -> Option<Vec3> {
        triangle_normal(self.a, self.b, self.c)
    }

    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        closest_point_on_triangle(p, self.a, self.b, self.c)
    }
}

/// Closest-triangle lookup on the anchoring surface.
///
/// Implementations must return a triangle for any finite point and must not
/// block: the simulation calls this several times per particle per tick.
pub trait SurfaceQuery {
    fn closest_triangle(&self, point: Vec3) -> Triangle;
}

impl<S: SurfaceQuery + ?Sized> SurfaceQuery for &S {
    fn closest_triangle(&self, point: Vec3) -> Triangle {
        (**self).closest_triangle(point)
    }
}

/// Triangle soup searched linearly.
#[derive(Clone, Debug)]
pub struct TriangleSurface {
    triangles: Vec<Triangle>,
}

impl TriangleSurface {
    /// Builds a surface from a non-empty list of triangles.
    ///
    /// ### Errors
    /// [`SimError::EmptySurface`] when `triangles` is empty. The query
    /// contract has no answer for an empty surface, so this is reported
    /// once here rather than on every lookup.
    pub fn new(triangles: Vec<Triangle>) -> Result<Self> {
        if triangles.is_empty() {
            return Err(SimError::EmptySurface);
        }
        Ok(Self { triangles })
    }

    /// Builds a surface from an indexed vertex buffer (three indices per
    /// triangle). Trailing indices that do not form a full triangle and
    /// out-of-range indices are ignored.
    pub fn from_indexed(vertices: &[Vec3], indices: &[u32]) -> Result<Self> {
        let triangles = indices
            .chunks_exact(3)
            .filter_map(|tri| {
                let a = vertices.get(tri[0] as usize)?;
                let b = vertices.get(tri[1] as usize)?;
                let c = vertices.get(tri[2] as usize)?;
                Some(Triangle::new(*a, *b, *c))
            })
            .collect();
        Self::new(triangles)
    }

    /// Builds a planar grid spanning `origin + s·u + t·v` for `s, t` in
    /// `[0, 1]`, split into `cells_u × cells_v` quads of two triangles each.
    ///
    /// Triangles are wound so that their normal is `u × v`.
    pub fn plane(origin: Vec3, u: Vec3, v: Vec3, cells_u: u32, cells_v: u32) -> Result<Self> {
        let cells_u = cells_u.max(1);
        let cells_v = cells_v.max(1);
        let du = u / cells_u as f32;
        let dv = v / cells_v as f32;

        let mut triangles = Vec::with_capacity((cells_u * cells_v * 2) as usize);
        for i in 0..cells_u {
            for j in 0..cells_v {
                let p00 = origin + du * i as f32 + dv * j as f32;
                let p10 = p00 + du;
                let p01 = p00 + dv;
                let p11 = p00 + du + dv;
                triangles.push(Triangle::new(p00, p10, p01));
                triangles.push(Triangle::new(p10, p11, p01));
            }
        }
        Self::new(triangles)
    }

    /// Merges the triangles of `other` into this surface.
    pub fn extend(&mut self, other: TriangleSurface) {
        self.triangles.extend(other.triangles);
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

impl SurfaceQuery for TriangleSurface {
    fn closest_triangle(&self, point: Vec3) -> Triangle {
        let mut best = self.triangles[0];
        let mut best_d2 = f32::MAX;
        for tri in &self.triangles {
            let d2 = tri.closest_point(point).distance_squared(point);
            if d2 < best_d2 {
                best_d2 = d2;
                best = *tri;
            }
        }
        best
    }
}
