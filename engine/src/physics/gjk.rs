// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use glam::Vec3;

use crate::{
    config::NarrowphaseSettings,
    physics::shape::{centroid, furthest_point},
};

const DEFAULT_MAX_ITERATIONS: usize = 64;
const EPSILON: f32 = 1e-6;

const SEARCH_DIRECTIONS: [Vec3; 6] = [
    Vec3::X,
    Vec3::NEG_X,
    Vec3::Y,
    Vec3::NEG_Y,
    Vec3::Z,
    Vec3::NEG_Z,
];

/// A vertex of the Minkowski difference `A - B` together with the points of
/// `A` and `B` that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportPoint {
    pub point: Vec3,
    pub on_a: Vec3,
    pub on_b: Vec3,
}

/// `furthest(A, d) - furthest(B, -d)`.
pub fn support(a: &[Vec3], b: &[Vec3], direction: Vec3) -> SupportPoint {
    let on_a = furthest_point(a, direction);
    let on_b = furthest_point(b, -direction);
    SupportPoint {
        point: on_a - on_b,
        on_a,
        on_b,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GjkParams {
    pub max_iterations: usize,
    pub epsilon: f32,
}

impl Default for GjkParams {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            epsilon: EPSILON,
        }
    }
}

impl From<&NarrowphaseSettings> for GjkParams {
    fn from(settings: &NarrowphaseSettings) -> Self {
        Self {
            max_iterations: settings.gjk_max_iterations,
            epsilon: settings.gjk_epsilon,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GjkHit {
    /// Terminal simplex. Holds 4 points when a tetrahedron enclosed the
    /// origin, fewer when the origin lies on a lower-dimensional simplex.
    pub simplex: Vec<SupportPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GjkResult {
    NoIntersection,
    Intersection(GjkHit),
}

/// Performs GJK intersection testing between two convex point sets.
pub fn gjk_intersect(a: &[Vec3], b: &[Vec3]) -> GjkResult {
    gjk_intersect_with_params(a, b, GjkParams::default())
}

pub fn gjk_intersect_with_params(a: &[Vec3], b: &[Vec3], params: GjkParams) -> GjkResult {
    if a.is_empty() || b.is_empty() {
        return GjkResult::NoIntersection;
    }

    let mut dir = initial_direction(a, b, params.epsilon);
    let mut simplex: Vec<SupportPoint> = Vec::with_capacity(4);

    let first = support(a, b, dir);
    simplex.push(first);
    dir = -first.point;

    for _ in 0..params.max_iterations {
        if dir.length_squared() <= params.epsilon {
            return GjkResult::Intersection(GjkHit { simplex });
        }

        let next = support(a, b, dir);
        if next.point.dot(dir) <= 0.0 {
            return GjkResult::NoIntersection;
        }

        simplex.push(next);
        if handle_simplex(&mut simplex, &mut dir, params.epsilon) {
            return GjkResult::Intersection(GjkHit { simplex });
        }
    }

    GjkResult::NoIntersection
}

fn initial_direction(a: &[Vec3], b: &[Vec3], epsilon: f32) -> Vec3 {
    let dir = centroid(b) - centroid(a);
    if dir.length_squared() <= epsilon {
        Vec3::NEG_Z
    } else {
        dir
    }
}

fn handle_simplex(simplex: &mut Vec<SupportPoint>, dir: &mut Vec3, epsilon: f32) -> bool {
    match simplex.len() {
        2 => handle_line(simplex, dir, epsilon),
        3 => handle_triangle(simplex, dir, epsilon),
        4 => handle_tetrahedron(simplex, dir),
        _ => false,
    }
}

fn handle_line(simplex: &mut Vec<SupportPoint>, dir: &mut Vec3, epsilon: f32) -> bool {
    let sa = simplex[1];
    let sb = simplex[0];
    let (a, b) = (sa.point, sb.point);
    let ab = b - a;
    let ab_len_sq = ab.length_squared();
    if ab_len_sq <= epsilon {
        // Both points coincide; search again from the newest one.
        *dir = -a;
        return false;
    }

    let t = (-a).dot(ab) / ab_len_sq;
    if t <= 0.0 {
        simplex.clear();
        simplex.push(sa);
        *dir = -a;
        return false;
    }
    if t >= 1.0 {
        simplex.clear();
        simplex.push(sb);
        *dir = -b;
        return false;
    }

    let closest = a + ab * t;
    *dir = -closest;
    if dir.length_squared() <= epsilon {
        // Origin is on the segment.
        *dir = Vec3::ZERO;
    }
    false
}

fn handle_triangle(simplex: &mut Vec<SupportPoint>, dir: &mut Vec3, epsilon: f32) -> bool {
    let (sa, sb, sc) = (simplex[2], simplex[1], simplex[0]);
    let (a, b, c) = (sa.point, sb.point, sc.point);

    let ab = b - a;
    let ac = c - a;
    let ao = -a;

    let d1 = ab.dot(ao);
    let d2 = ac.dot(ao);
    if d1 <= 0.0 && d2 <= 0.0 {
        *simplex = vec![sa];
        *dir = -a;
        return false;
    }

    let bo = -b;
    let d3 = ab.dot(bo);
    let d4 = ac.dot(bo);
    if d3 >= 0.0 && d4 <= d3 {
        *simplex = vec![sb];
        *dir = -b;
        return false;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        *simplex = vec![sb, sa];
        *dir = -(a + ab * v);
        return false;
    }

    let co = -c;
    let d5 = ab.dot(co);
    let d6 = ac.dot(co);
    if d6 >= 0.0 && d5 <= d6 {
        *simplex = vec![sc];
        *dir = -c;
        return false;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        *simplex = vec![sc, sa];
        *dir = -(a + ac * w);
        return false;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        *simplex = vec![sc, sb];
        *dir = -(b + (c - b) * w);
        return false;
    }

    // Origin projects inside the triangle; search along its normal.
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    *dir = -(a + ab * v + ac * w);
    if dir.length_squared() <= epsilon {
        // Origin lies in the triangle.
        *dir = Vec3::ZERO;
    }
    false
}

fn handle_tetrahedron(simplex: &mut Vec<SupportPoint>, dir: &mut Vec3) -> bool {
    let (a, b, c, d) = (simplex[3], simplex[2], simplex[1], simplex[0]);
    let ao = -a.point;

    for (p, q, opposite) in [(b, c, d), (c, d, b), (d, b, c)] {
        if let Some(normal) = face_outside(a.point, p.point, q.point, opposite.point, ao) {
            *simplex = vec![q, p, a];
            *dir = normal;
            return false;
        }
    }

    true
}

/// Normal of face `abc` pointing away from `opposite`, if the origin lies
/// on that side.
fn face_outside(a: Vec3, b: Vec3, c: Vec3, opposite: Vec3, ao: Vec3) -> Option<Vec3> {
    let mut normal = (b - a).cross(c - a);
    if normal.dot(opposite - a) > 0.0 {
        normal = -normal;
    }
    (normal.dot(ao) > 0.0).then_some(normal)
}

/// Grows a terminal GJK simplex into a tetrahedron with non-zero volume so
/// EPA can start from it. `None` when the Minkowski difference is flat.
pub fn complete_tetrahedron(
    a: &[Vec3],
    b: &[Vec3],
    simplex: &[SupportPoint],
    epsilon: f32,
) -> Option<[SupportPoint; 4]> {
    let mut points: Vec<SupportPoint> = simplex.iter().take(4).copied().collect();
    if points.is_empty() {
        points.push(support(a, b, Vec3::X));
    }

    if points.len() == 1 {
        let origin = points[0].point;
        let extra = SEARCH_DIRECTIONS
            .iter()
            .map(|d| support(a, b, *d))
            .find(|s| s.point.distance_squared(origin) > epsilon)?;
        points.push(extra);
    }

    if points.len() == 2 {
        let p0 = points[0].point;
        let line = points[1].point - p0;
        let axis = least_aligned_axis(line);
        let n1 = line.cross(axis);
        let n2 = line.cross(n1);
        let extra = [n1, -n1, n2, -n2]
            .iter()
            .map(|d| support(a, b, *d))
            .find(|s| (s.point - p0).cross(line).length_squared() > epsilon * line.length_squared())?;
        points.push(extra);
    }

    if points.len() == 3 {
        let p0 = points[0].point;
        let normal = (points[1].point - p0).cross(points[2].point - p0);
        if normal.length_squared() <= epsilon * epsilon {
            return None;
        }
        let unit = normal.normalize();
        let extra = [unit, -unit]
            .iter()
            .map(|d| support(a, b, *d))
            .find(|s| unit.dot(s.point - p0).abs() > epsilon)?;
        points.push(extra);
    }

    let [p0, p1, p2, p3] = [points[0], points[1], points[2], points[3]];
    let volume = (p1.point - p0.point)
        .cross(p2.point - p0.point)
        .dot(p3.point - p0.point);
    if volume.abs() <= epsilon {
        return None;
    }
    Some([p0, p1, p2, p3])
}

fn least_aligned_axis(v: Vec3) -> Vec3 {
    let a = v.abs();
    if a.x <= a.y && a.x <= a.z {
        Vec3::X
    } else if a.y <= a.z {
        Vec3::Y
    } else {
        Vec3::Z
    }
}
