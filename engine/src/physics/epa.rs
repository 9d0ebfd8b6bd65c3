// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use glam::Vec3;

use crate::{
    config::NarrowphaseSettings,
    physics::gjk::{
        GjkParams, GjkResult, SupportPoint, complete_tetrahedron, gjk_intersect_with_params,
        support,
    },
};

const EPA_MAX_ITERATIONS: usize = 128;
const EPA_TOLERANCE: f32 = 1e-4;
const EPSILON: f32 = 1e-6;
const FACE_VISIBILITY_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpaParams {
    pub max_iterations: usize,
    pub tolerance: f32,
    pub visibility_epsilon: f32,
}

impl Default for EpaParams {
    fn default() -> Self {
        Self {
            max_iterations: EPA_MAX_ITERATIONS,
            tolerance: EPA_TOLERANCE,
            visibility_epsilon: FACE_VISIBILITY_EPSILON,
        }
    }
}

impl From<&NarrowphaseSettings> for EpaParams {
    fn from(settings: &NarrowphaseSettings) -> Self {
        Self {
            max_iterations: settings.epa_max_iterations,
            tolerance: settings.epa_tolerance,
            visibility_epsilon: settings.epa_visibility_epsilon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpaResult {
    /// Unit normal pointing from shape A toward shape B.
    pub normal: Vec3,
    pub depth: f32,
    /// Deepest point of A inside B, interpolated from the closest face.
    pub on_a: Vec3,
    pub on_b: Vec3,
}

#[derive(Debug, Clone)]
struct Face {
    indices: [usize; 3],
    normal: Vec3,
    distance: f32,
}

/// Runs GJK and, on overlap, expands the terminal simplex with EPA.
///
/// Returns `None` when the shapes are disjoint or when the Minkowski
/// difference is too flat to build a polytope from.
pub fn penetration(
    a: &[Vec3],
    b: &[Vec3],
    gjk_params: GjkParams,
    epa_params: EpaParams,
) -> Option<EpaResult> {
    let hit = match gjk_intersect_with_params(a, b, gjk_params) {
        GjkResult::Intersection(hit) => hit,
        GjkResult::NoIntersection => return None,
    };
    let tetrahedron = complete_tetrahedron(a, b, &hit.simplex, gjk_params.epsilon)?;
    epa(a, b, &tetrahedron, epa_params)
}

/// Expanding polytope algorithm over `A - B`, seeded with a tetrahedron that
/// encloses the origin.
pub fn epa(
    a: &[Vec3],
    b: &[Vec3],
    tetrahedron: &[SupportPoint; 4],
    params: EpaParams,
) -> Option<EpaResult> {
    let (mut vertices, mut faces, interior) = build_initial_polytope(tetrahedron)?;

    vertices.reserve(64);
    faces.reserve(128);

    let mut horizon_edges: Vec<(usize, usize)> = Vec::with_capacity(64);

    for _ in 0..params.max_iterations {
        horizon_edges.clear();

        let closest = faces.first()?.clone();

        let next = support(a, b, closest.normal);
        let distance_delta = closest.normal.dot(next.point) - closest.distance;
        if distance_delta <= params.tolerance {
            return finish(&vertices, &closest);
        }

        // The polytope cannot grow past a vertex it already has.
        if vertices
            .iter()
            .any(|v| (v.point - next.point).length_squared() <= EPSILON * 10.0)
        {
            return finish(&vertices, &closest);
        }

        let new_index = vertices.len();
        vertices.push(next);

        faces.retain(|face| {
            let face_point = vertices[face.indices[0]].point;
            let visible = face.normal.dot(next.point - face_point) >= params.visibility_epsilon;
            if visible {
                add_edge(&mut horizon_edges, face.indices[0], face.indices[1]);
                add_edge(&mut horizon_edges, face.indices[1], face.indices[2]);
                add_edge(&mut horizon_edges, face.indices[2], face.indices[0]);
            }
            !visible
        });

        if horizon_edges.is_empty() {
            return finish(&vertices, &closest);
        }

        for (i, j) in &horizon_edges {
            if let Some(face) = make_face_outward(&vertices, [*i, *j, new_index], interior) {
                insert_sorted(&mut faces, face);
            }
        }

        if faces.is_empty() {
            return finish(&vertices, &closest);
        }
    }

    let closest = faces.first()?;
    finish(&vertices, closest)
}

fn build_initial_polytope(
    tetrahedron: &[SupportPoint; 4],
) -> Option<(Vec<SupportPoint>, Vec<Face>, Vec3)> {
    let vertices = tetrahedron.to_vec();
    let interior = vertices.iter().map(|v| v.point).sum::<Vec3>() / 4.0;

    let mut faces = Vec::with_capacity(4);
    for indices in [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]] {
        insert_sorted(&mut faces, make_face_outward(&vertices, indices, interior)?);
    }

    Some((vertices, faces, interior))
}

/// Builds a face whose normal points away from `interior`, flipping the
/// winding when needed. `None` for degenerate triangles.
fn make_face_outward(vertices: &[SupportPoint], indices: [usize; 3], interior: Vec3) -> Option<Face> {
    let [i0, mut i1, mut i2] = indices;
    let a = vertices[i0].point;
    let mut normal = (vertices[i1].point - a).cross(vertices[i2].point - a);
    if normal.length_squared() < EPSILON * EPSILON {
        return None;
    }
    normal = normal.normalize();

    if normal.dot(a - interior) < 0.0 {
        normal = -normal;
        std::mem::swap(&mut i1, &mut i2);
    }

    Some(Face {
        indices: [i0, i1, i2],
        normal,
        distance: normal.dot(a).max(0.0),
    })
}

/// Keeps `faces` ordered by distance to the origin, nearest first.
fn insert_sorted(faces: &mut Vec<Face>, face: Face) {
    let at = faces.partition_point(|f| f.distance <= face.distance);
    faces.insert(at, face);
}

/// Edges shared by two visible faces cancel; what remains is the horizon.
fn add_edge(edges: &mut Vec<(usize, usize)>, a: usize, b: usize) {
    if let Some(index) = edges.iter().position(|(u, v)| *u == b && *v == a) {
        edges.swap_remove(index);
    } else {
        edges.push((a, b));
    }
}

fn finish(vertices: &[SupportPoint], face: &Face) -> Option<EpaResult> {
    if !face.normal.is_finite() || !face.distance.is_finite() {
        return None;
    }

    let [s0, s1, s2] = face.indices.map(|i| vertices[i]);
    let weights = barycentric(face.normal * face.distance, s0.point, s1.point, s2.point);

    Some(EpaResult {
        normal: face.normal,
        depth: face.distance,
        on_a: s0.on_a * weights.x + s1.on_a * weights.y + s2.on_a * weights.z,
        on_b: s0.on_b * weights.x + s1.on_b * weights.y + s2.on_b * weights.z,
    })
}

fn barycentric(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= f32::EPSILON {
        return Vec3::splat(1.0 / 3.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Vec3::new(1.0 - v - w, v, w)
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use glam::Quat;
    use std::f32::consts::{PI, TAU};

    use crate::physics::{aabb::Aabb, shape::Obb};

    use super::*;

    fn cuboid_at(center: Vec3, half: Vec3) -> Vec<Vec3> {
        Aabb::new(center - half, center + half).corners().to_vec()
    }

    fn uv_sphere(center: Vec3, radius: f32, bands: usize, segments: usize) -> Vec<Vec3> {
        let mut points = vec![center + Vec3::X * radius, center - Vec3::X * radius];
        for i in 1..bands {
            let theta = PI * i as f32 / bands as f32;
            for j in 0..segments {
                let phi = TAU * j as f32 / segments as f32;
                let dir = Vec3::new(theta.cos(), theta.sin() * phi.cos(), theta.sin() * phi.sin());
                points.push(center + dir * radius);
            }
        }
        points
    }

    fn run_epa(a: &[Vec3], b: &[Vec3]) -> EpaResult {
        penetration(a, b, GjkParams::default(), EpaParams::default()).expect("EPA failed")
    }

    fn assert_normal_points_from_a_to_b(normal: Vec3, a: &[Vec3], b: &[Vec3]) {
        let ab = crate::physics::shape::centroid(b) - crate::physics::shape::centroid(a);
        if ab.length_squared() > EPSILON {
            assert!(normal.dot(ab) >= -1e-4);
        }
    }

    #[test]
    fn epa_box_vs_box_axis_aligned() {
        let a = cuboid_at(Vec3::ZERO, Vec3::ONE);
        let b = cuboid_at(Vec3::new(1.5, 0.0, 0.0), Vec3::ONE);

        let result = run_epa(&a, &b);
        assert_approx_eq!(result.depth, 0.5, 1e-4);
        assert_approx_eq!(result.normal.x, 1.0, 1e-4);
        assert_normal_points_from_a_to_b(result.normal, &a, &b);
    }

    #[test]
    fn epa_box_vs_box_rotated() {
        let a = cuboid_at(Vec3::ZERO, Vec3::ONE);
        let b = Obb::new(Vec3::new(0.8, 1.6, 0.0), Quat::from_rotation_z(0.5), Vec3::ONE).vertices();

        let result = run_epa(&a, &b);
        assert!(result.depth > 0.0);
        assert_approx_eq!(result.normal.length(), 1.0, 1e-4);
        assert_normal_points_from_a_to_b(result.normal, &a, &b);
    }

    #[test]
    fn epa_deep_penetration() {
        let a = cuboid_at(Vec3::ZERO, Vec3::splat(2.0));
        let b = cuboid_at(Vec3::new(0.1, 0.3, 0.0), Vec3::splat(2.0));

        let result = run_epa(&a, &b);
        // Smallest overlap is along y: 4.0 - 0.3.
        assert_approx_eq!(result.depth, 3.7, 1e-3);
        assert_approx_eq!(result.normal.y, 1.0, 1e-4);
    }

    #[test]
    fn epa_non_uniform_cuboid_axis_aligned() {
        let half = Vec3::new(2.0, 1.0, 1.0);
        let a = cuboid_at(Vec3::ZERO, half);
        let b = cuboid_at(Vec3::new(3.0, 0.0, 0.0), half);

        let result = run_epa(&a, &b);
        // Overlap on X: (2 + 2) - 3 = 1.0
        assert_approx_eq!(result.depth, 1.0, 1e-4);
        assert!(result.normal.x > 0.9);
    }

    #[test]
    fn epa_nearly_coplanar_sweep() {
        let a = cuboid_at(Vec3::ZERO, Vec3::ONE);
        for i in 1..50 {
            let e = 0.05 / i as f32;
            let b = cuboid_at(Vec3::new(0.0, 0.0, 2.0 - e), Vec3::ONE);
            let result = run_epa(&a, &b);
            assert_approx_eq!(result.depth, e, 1e-4);
            assert_approx_eq!(result.normal.z, 1.0, 1e-4);
        }
    }

    #[test]
    fn witness_points_span_the_penetration() {
        let a = cuboid_at(Vec3::ZERO, Vec3::ONE);
        let b = cuboid_at(Vec3::new(0.0, 1.75, 0.2), Vec3::ONE);

        let result = run_epa(&a, &b);
        let separation = result.on_a - result.on_b;
        assert_approx_eq!(separation.dot(result.normal), result.depth, 1e-3);
        assert_approx_eq!(result.on_a.y, 1.0, 1e-3);
        assert_approx_eq!(result.on_b.y, 0.75, 1e-3);
    }

    #[test]
    fn uv_spheres_report_half_unit_depth() {
        let a = uv_sphere(Vec3::ZERO, 1.0, 64, 128);
        let directions = [
            Vec3::X,
            Vec3::Y,
            Vec3::ONE.normalize(),
            Vec3::new(0.38, -0.89, 0.25).normalize(),
        ];

        for direction in directions {
            let b = uv_sphere(direction * 1.5, 1.0, 64, 128);
            let result = run_epa(&a, &b);
            assert_approx_eq!(result.depth, 0.5, 1e-3);
            assert!(result.normal.dot(direction) > 0.99, "{direction:?}: {:?}", result.normal);
        }
    }

    #[test]
    fn separated_shapes_have_no_penetration() {
        let a = cuboid_at(Vec3::ZERO, Vec3::ONE);
        let b = cuboid_at(Vec3::new(0.0, 2.5, 0.0), Vec3::ONE);
        assert!(penetration(&a, &b, GjkParams::default(), EpaParams::default()).is_none());
    }

    #[test]
    fn horizon_edges_cancel() {
        let mut edges = Vec::new();
        add_edge(&mut edges, 0, 1);
        add_edge(&mut edges, 1, 2);
        add_edge(&mut edges, 1, 0);
        assert_eq!(edges, vec![(1, 2)]);
    }
}
