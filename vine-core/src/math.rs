//! Vector, quaternion and matrix helpers used by the growth rules and the
//! shape-matching solver.
//!
//! Everything here is a pure function over `glam` value types. Operations
//! glam already provides (matrix addition, quaternion to matrix conversion,
//! angle between vectors, scalar clamp) are used directly by callers.
//!
//! The only non-deterministic helpers are [`random_unit_vector`] and
//! [`random_perpendicular`], which draw from the generator they are given.

use glam::{Mat3, Quat, Vec3};
use rand::Rng;

/// Squared length below which a vector is treated as degenerate.
pub const DEGENERATE_EPS: f32 = 1e-10;

/// Number of cyclic Jacobi sweeps used by [`polar_decomposition`].
const JACOBI_SWEEPS: usize = 24;

/// Attempts made by the random samplers before falling back to a fixed answer.
const MAX_SAMPLES: usize = 32;

/// Returns the outer product `x ⊗ y` (i.e. `x · yᵗ`).
#[inline]
pub fn outer(x: Vec3, y: Vec3) -> Mat3 {
    Mat3::from_cols(x * y.x, x * y.y, x * y.z)
}

/// Returns the pure rotation closest to `a`.
///
/// Computes `U · Vᵗ` from the singular value decomposition `A = U Σ Vᵗ`,
/// ignoring `Σ`. The right singular vectors come from a Jacobi
/// eigen-decomposition of `AᵗA`; the left ones are `A vᵢ / σᵢ`.
///
/// Degenerate inputs never produce non-finite values:
/// - `A = 0` returns the identity.
/// - Rank-deficient matrices complete the missing singular vectors to a
///   right-handed orthonormal frame.
/// - Reflections are removed, so the result always has determinant `+1`.
///
/// ### Parameters
/// - `a` - Any finite 3x3 matrix.
///
/// ### Returns
/// A rotation matrix.
pub fn polar_decomposition(a: Mat3) -> Mat3 {
    // The result is scale invariant; normalizing keeps tiny masses away from
    // the f32 denormal range in AᵗA.
    let scale = a.abs().to_cols_array().into_iter().fold(0.0f32, f32::max);
    if scale <= f32::MIN_POSITIVE {
        return Mat3::IDENTITY;
    }
    let a = a * scale.recip();
    let (values, vectors) = symmetric_eigen(a.transpose() * a);

    // Sort eigen pairs by descending eigenvalue.
    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| values[j].total_cmp(&values[i]));

    let v0 = vectors.col(order[0]);
    let v1 = vectors.col(order[1]);
    // Force a right-handed V so that the result is a proper rotation.
    let v2 = v0.cross(v1);

    let sigma0 = values[order[0]].max(0.0).sqrt();
    let sigma1 = values[order[1]].max(0.0).sqrt();

    if sigma0 <= 1e-12 {
        return Mat3::IDENTITY;
    }
    let eps = sigma0 * 1e-5;

    let u0 = match (a * v0).try_normalize() {
        Some(u) => u,
        None => return Mat3::IDENTITY,
    };

    let u1 = if sigma1 > eps {
        let av1 = a * v1;
        (av1 - u0 * u0.dot(av1))
            .try_normalize()
            .unwrap_or_else(|| u0.any_orthonormal_vector())
    } else {
        u0.any_orthonormal_vector()
    };
    let u2 = u0.cross(u1);

    outer(u0, v0) + outer(u1, v1) + outer(u2, v2)
}

/// Eigen-decomposition of a symmetric 3x3 matrix by cyclic Jacobi rotations.
///
/// Returns the eigenvalues and a matrix whose columns are the matching
/// unit eigenvectors.
fn symmetric_eigen(m: Mat3) -> ([f32; 3], Mat3) {
    // a[row][col]; the input is symmetric so the storage order is irrelevant.
    let mut a = m.to_cols_array_2d();
    let mut v = [[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    for _ in 0..JACOBI_SWEEPS {
        let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        let scale = a[0][0] * a[0][0] + a[1][1] * a[1][1] + a[2][2] * a[2][2];
        if off <= 1e-14 * scale.max(f32::MIN_POSITIVE) {
            break;
        }

        for (p, q) in [(0usize, 1usize), (0, 2), (1, 2)] {
            let apq = a[p][q];
            if apq.abs() <= f32::MIN_POSITIVE {
                continue;
            }

            let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            // A' = Jᵗ A J, columns first.
            for row in a.iter_mut() {
                let akp = row[p];
                let akq = row[q];
                row[p] = c * akp - s * akq;
                row[q] = s * akp + c * akq;
            }
            for k in 0..3 {
                let apk = a[p][k];
                let aqk = a[q][k];
                a[p][k] = c * apk - s * aqk;
                a[q][k] = s * apk + c * aqk;
            }
            for row in v.iter_mut() {
                let vkp = row[p];
                let vkq = row[q];
                row[p] = c * vkp - s * vkq;
                row[q] = s * vkp + c * vkq;
            }
        }
    }

    let values = [a[0][0], a[1][1], a[2][2]];
    let vectors = Mat3::from_cols(
        Vec3::new(v[0][0], v[1][0], v[2][0]),
        Vec3::new(v[0][1], v[1][1], v[2][1]),
        Vec3::new(v[0][2], v[1][2], v[2][2]),
    );
    (values, vectors)
}

/// Returns the unit normal `normalize((b - a) × (c - a))` of a triangle,
/// or `None` when the triangle has (almost) no area.
pub fn triangle_normal(a: Vec3, b: Vec3, c: Vec3) -> Option<Vec3> {
    let n = (b - a).cross(c - a);
    if n.length_squared() <= DEGENERATE_EPS * DEGENERATE_EPS {
        return None;
    }
    n.try_normalize()
}

/// Cubic smoothstep of `t`, clamped to `[0, 1]`.
#[inline]
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Linear interpolation from `a` to `b` with a smoothstepped blend factor.
#[inline]
pub fn smooth_lerp(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    a.lerp(b, smoothstep(t))
}

/// Projects `v` onto the plane with unit normal `n`: `v - (v·n)n`.
#[inline]
pub fn project_on_plane(v: Vec3, n: Vec3) -> Vec3 {
    v - n * v.dot(n)
}

/// Closest point to `p` on the segment `[a, b]`.
pub fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 <= DEGENERATE_EPS {
        return a;
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest point to `p` on the triangle `(a, b, c)`.
///
/// Classifies `p` against the Voronoi regions of the triangle: the three
/// vertex regions, then the three edge regions, then the face. Triangles
/// with no area fall back to the closest point on their edges, so the
/// result is always finite for finite input.
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;

    if ab.cross(ac).length_squared() <= DEGENERATE_EPS * DEGENERATE_EPS {
        return closest_point_on_degenerate(p, a, b, c);
    }

    // Vertex region A.
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    // Vertex region B.
    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    // Vertex region C.
    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    // Edge region AB.
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    // Edge region AC.
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    // Edge region BC.
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    // Face region.
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

fn closest_point_on_degenerate(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    [
        closest_point_on_segment(p, a, b),
        closest_point_on_segment(p, b, c),
        closest_point_on_segment(p, c, a),
    ]
    .into_iter()
    .min_by(|x, y| x.distance_squared(p).total_cmp(&y.distance_squared(p)))
    .unwrap_or(a)
}

/// Returns `q` premultiplied by a rotation of `angle` radians around `axis`,
/// renormalized.
///
/// `axis` must be unit length.
#[inline]
pub fn rotate(q: Quat, axis: Vec3, angle: f32) -> Quat {
    (Quat::from_axis_angle(axis, angle) * q).normalize()
}

/// Uniformly distributed random unit vector.
pub fn random_unit_vector(rng: &mut impl Rng) -> Vec3 {
    for _ in 0..MAX_SAMPLES {
        let v = Vec3::new(
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
        );
        let len2 = v.length_squared();
        if len2 > 1e-6 && len2 <= 1.0 {
            return v / len2.sqrt();
        }
    }
    Vec3::Y
}

/// Random unit vector perpendicular to `dir`.
///
/// Samples are re-drawn while their projection onto the plane orthogonal to
/// `dir` is too short to normalize reliably.
pub fn random_perpendicular(dir: Vec3, rng: &mut impl Rng) -> Vec3 {
    let n = dir.normalize_or(Vec3::Z);
    for _ in 0..MAX_SAMPLES {
        let v = project_on_plane(random_unit_vector(rng), n);
        if v.length_squared() > 1e-4 {
            return v.normalize();
        }
    }
    n.any_orthonormal_vector()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const EPS: f32 = 1e-4;

    fn assert_mat_near(a: Mat3, b: Mat3) {
        assert!(a.abs_diff_eq(b, EPS), "matrices differ:\n{a:?}\n{b:?}");
    }

    fn assert_rotation(m: Mat3) {
        assert!(m.is_finite());
        assert!((m.determinant() - 1.0).abs() < EPS, "det = {}", m.determinant());
        assert_mat_near(m * m.transpose(), Mat3::IDENTITY);
    }

    #[test]
    fn polar_decomposition_keeps_pure_rotations() {
        let rotations = [
            Mat3::IDENTITY,
            Mat3::from_quat(Quat::from_rotation_z(0.3)),
            Mat3::from_quat(Quat::from_axis_angle(Vec3::new(1.0, 2.0, -0.5).normalize(), 2.1)),
            Mat3::from_quat(Quat::from_rotation_x(std::f32::consts::PI)),
        ];

        for r in rotations {
            assert_mat_near(polar_decomposition(r), r);
        }
    }

    #[test]
    fn polar_decomposition_of_zero_is_identity() {
        assert_eq!(polar_decomposition(Mat3::ZERO), Mat3::IDENTITY);
    }

    #[test]
    fn polar_decomposition_strips_stretch() {
        let r = Mat3::from_quat(Quat::from_rotation_y(0.8));
        let stretch = Mat3::from_diagonal(Vec3::new(3.0, 0.5, 1.7));

        assert_mat_near(polar_decomposition(r * stretch), r);
    }

    #[test]
    fn polar_decomposition_handles_rank_deficient_input() {
        // Rank one: everything maps onto the x axis.
        let a = outer(Vec3::X, Vec3::new(0.0, 1.0, 0.0));
        assert_rotation(polar_decomposition(a));

        // Rank two.
        let b = outer(Vec3::X, Vec3::X) + outer(Vec3::Y, Vec3::Z);
        assert_rotation(polar_decomposition(b));
    }

    #[test]
    fn polar_decomposition_removes_reflections() {
        let mirror = Mat3::from_diagonal(Vec3::new(1.0, 1.0, -1.0));
        assert_rotation(polar_decomposition(mirror));
    }

    #[test]
    fn polar_decomposition_is_scale_invariant() {
        let r = Mat3::from_quat(Quat::from_rotation_x(0.6));
        let stretch = Mat3::from_diagonal(Vec3::new(2.0, 1.0, 0.5));

        assert_mat_near(polar_decomposition(r * stretch * 1e-8), r);
    }

    #[test]
    fn triangle_normal_follows_winding() {
        let n = triangle_normal(Vec3::ZERO, Vec3::X, Vec3::Y).unwrap();
        assert!(n.abs_diff_eq(Vec3::Z, EPS));

        let flipped = triangle_normal(Vec3::ZERO, Vec3::Y, Vec3::X).unwrap();
        assert!(flipped.abs_diff_eq(-Vec3::Z, EPS));
    }

    #[test]
    fn triangle_normal_of_degenerate_triangle_is_none() {
        assert!(triangle_normal(Vec3::ZERO, Vec3::X, Vec3::X * 2.0).is_none());
        assert!(triangle_normal(Vec3::ONE, Vec3::ONE, Vec3::ONE).is_none());
    }

    #[test]
    fn smooth_lerp_hits_endpoints_and_midpoint() {
        let a = Vec3::ZERO;
        let b = Vec3::new(2.0, 4.0, -2.0);
        assert_eq!(smooth_lerp(a, b, 0.0), a);
        assert_eq!(smooth_lerp(a, b, 1.0), b);
        assert!(smooth_lerp(a, b, 0.5).abs_diff_eq(b * 0.5, EPS));
        // Smoothstep eases in: less than linear below the midpoint.
        assert!(smooth_lerp(a, b, 0.3).y < 0.3 * b.y);
    }

    #[test]
    fn project_on_plane_removes_normal_component() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let p = project_on_plane(v, Vec3::Y);
        assert_eq!(p, Vec3::new(1.0, 0.0, 3.0));
        assert!(p.dot(Vec3::Y).abs() < EPS);
    }

    #[test]
    fn closest_point_on_triangle_regions() {
        let a = Vec3::ZERO;
        let b = Vec3::new(2.0, 0.0, 0.0);
        let c = Vec3::new(0.0, 2.0, 0.0);

        // Coincident with a vertex.
        assert_eq!(closest_point_on_triangle(a, a, b, c), a);
        // Vertex regions.
        assert_eq!(closest_point_on_triangle(Vec3::new(-1.0, -1.0, 0.5), a, b, c), a);
        assert_eq!(closest_point_on_triangle(Vec3::new(3.0, -0.5, 0.0), a, b, c), b);
        assert_eq!(closest_point_on_triangle(Vec3::new(-0.5, 3.0, 0.0), a, b, c), c);
        // Edge region AB.
        let q = closest_point_on_triangle(Vec3::new(1.0, -1.0, 0.0), a, b, c);
        assert!(q.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), EPS));
        // Edge region BC.
        let q = closest_point_on_triangle(Vec3::new(2.0, 2.0, 0.0), a, b, c);
        assert!(q.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), EPS));
    }

    #[test]
    fn closest_point_above_face_lies_inside_triangle() {
        let a = Vec3::ZERO;
        let b = Vec3::new(2.0, 0.0, 0.0);
        let c = Vec3::new(0.0, 2.0, 0.0);
        let p = Vec3::new(0.5, 0.5, 3.0);

        let q = closest_point_on_triangle(p, a, b, c);
        assert!(q.abs_diff_eq(Vec3::new(0.5, 0.5, 0.0), EPS));
        assert!(q.z.abs() < EPS);
        assert!(q.x >= 0.0 && q.y >= 0.0 && q.x + q.y <= 2.0);

        // The plane distance is never larger than the distance to any vertex.
        let d = p.distance(q);
        for v in [a, b, c] {
            assert!(d <= p.distance(v));
        }
    }

    #[test]
    fn closest_point_on_degenerate_triangle_is_finite() {
        let p = Vec3::new(0.3, 1.0, 0.0);
        let collinear = closest_point_on_triangle(p, Vec3::ZERO, Vec3::X, Vec3::X * 2.0);
        assert!(collinear.is_finite());
        assert!(collinear.abs_diff_eq(Vec3::new(0.3, 0.0, 0.0), EPS));

        let point = closest_point_on_triangle(p, Vec3::ONE, Vec3::ONE, Vec3::ONE);
        assert_eq!(point, Vec3::ONE);
    }

    #[test]
    fn rotate_keeps_unit_length() {
        let mut q = Quat::IDENTITY;
        for i in 0..1000 {
            q = rotate(q, Vec3::new(1.0, 1.0, 0.0).normalize(), 0.01 * i as f32);
        }
        assert!((q.length() - 1.0).abs() < EPS);
    }

    #[test]
    fn random_perpendicular_is_unit_and_orthogonal() {
        let mut rng = StdRng::seed_from_u64(7);
        let dirs = [Vec3::X, Vec3::Y, Vec3::new(1.0, -2.0, 0.5).normalize()];

        for dir in dirs {
            for _ in 0..50 {
                let p = random_perpendicular(dir, &mut rng);
                assert!((p.length() - 1.0).abs() < EPS);
                assert!(p.dot(dir).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn random_unit_vector_is_unit() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert!((random_unit_vector(&mut rng).length() - 1.0).abs() < EPS);
        }
    }
}
