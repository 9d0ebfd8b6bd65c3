// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

//! Contact point generation for a colliding pair.
//!
//! The reference feature is projected onto a contact plane, turned into a
//! convex polygon and used to clip the incident feature. Edge-edge contacts
//! collapse to the midpoint of the closest points between the two edges.

use glam::{Vec2, Vec3};

use crate::{config::NarrowphaseSettings, error::ManifoldError, physics::sat::SatAxis};

const MAX_FACE_POINTS: usize = 4;
const DUPLICATE_DISTANCE: f32 = 1e-6;
const SEGMENT_EPSILON: f32 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

/// What the narrow phase knows about the touching features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactFeature {
    /// A face of the given side is the reference.
    Face { reference: Side },
    EdgeEdge,
    /// No feature information; derived from the point sets.
    Unknown,
}

impl From<SatAxis> for ContactFeature {
    fn from(axis: SatAxis) -> Self {
        match axis {
            SatAxis::FaceA(_) => ContactFeature::Face { reference: Side::A },
            SatAxis::FaceB(_) => ContactFeature::Face { reference: Side::B },
            SatAxis::Edge(..) => ContactFeature::EdgeEdge,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManifoldParams {
    pub feature_tolerance: f32,
    pub clip_epsilon: f32,
}

impl Default for ManifoldParams {
    fn default() -> Self {
        Self {
            feature_tolerance: 1e-3,
            clip_epsilon: 1e-6,
        }
    }
}

impl From<&NarrowphaseSettings> for ManifoldParams {
    fn from(settings: &NarrowphaseSettings) -> Self {
        Self {
            feature_tolerance: settings.feature_tolerance,
            clip_epsilon: settings.clip_epsilon,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactManifold {
    /// World-space contact points.
    pub points: Vec<Vec3>,
    /// Unit normal from body A toward body B.
    pub normal: Vec3,
    pub depth: f32,
}

/// Orthonormal frame of the contact plane.
#[derive(Debug, Clone, Copy)]
struct ContactPlane {
    origin: Vec3,
    u: Vec3,
    v: Vec3,
}

impl ContactPlane {
    fn new(origin: Vec3, normal: Vec3) -> Self {
        let (u, v) = contact_basis(normal);
        Self { origin, u, v }
    }

    fn project(&self, p: Vec3) -> Vec2 {
        let d = p - self.origin;
        Vec2::new(d.dot(self.u), d.dot(self.v))
    }

    fn lift(&self, p: Vec2) -> Vec3 {
        self.origin + self.u * p.x + self.v * p.y
    }
}

/// Builds the contact manifold of two overlapping shapes given as world
/// points. `normal` points from A toward B.
pub fn build_manifold(
    points_a: &[Vec3],
    points_b: &[Vec3],
    normal: Vec3,
    depth: f32,
    feature: ContactFeature,
    params: ManifoldParams,
) -> Result<ContactManifold, ManifoldError> {
    if !normal.is_finite() || normal.length_squared() <= SEGMENT_EPSILON {
        return Err(ManifoldError::DegenerateNormal);
    }
    let normal = normal.normalize();

    let points = match feature {
        ContactFeature::Face { reference: Side::A } => {
            let reference = extreme_points(points_a, normal, MAX_FACE_POINTS);
            let incident = incident_points(points_b, -normal, params.feature_tolerance);
            clip_features(&reference, &incident, normal, params)?
        }
        ContactFeature::Face { reference: Side::B } => {
            let reference = extreme_points(points_b, -normal, MAX_FACE_POINTS);
            let incident = incident_points(points_a, normal, params.feature_tolerance);
            clip_features(&reference, &incident, normal, params)?
        }
        ContactFeature::EdgeEdge => {
            let edge_a = extreme_points(points_a, normal, 2);
            let edge_b = extreme_points(points_b, -normal, 2);
            vec![edge_edge_contact(&edge_a, &edge_b)]
        }
        ContactFeature::Unknown => {
            let feature_a = feature_points(points_a, normal, params.feature_tolerance);
            let feature_b = feature_points(points_b, -normal, params.feature_tolerance);
            match (feature_a.len(), feature_b.len()) {
                (0, _) | (_, 0) => return Err(ManifoldError::EmptyClip),
                (1, _) => vec![feature_a[0]],
                (_, 1) => vec![feature_b[0]],
                (2, 2) => vec![edge_edge_contact(&feature_a, &feature_b)],
                (len_a, len_b) if len_a >= len_b => {
                    clip_features(&feature_a, &feature_b, normal, params)?
                }
                _ => clip_features(&feature_b, &feature_a, normal, params)?,
            }
        }
    };

    Ok(ContactManifold {
        points: dedup_points(points),
        normal,
        depth,
    })
}

fn clip_features(
    reference: &[Vec3],
    incident: &[Vec3],
    normal: Vec3,
    params: ManifoldParams,
) -> Result<Vec<Vec3>, ManifoldError> {
    let Some(origin) = reference.first().copied() else {
        return Err(ManifoldError::EmptyClip);
    };
    let plane = ContactPlane::new(origin, normal);
    let eps = params.clip_epsilon;

    let reference_2d: Vec<Vec2> = reference.iter().map(|p| plane.project(*p)).collect();
    let incident_2d: Vec<Vec2> = incident.iter().map(|p| plane.project(*p)).collect();

    let mut reference_hull = graham_scan(&reference_2d, eps);
    let mut incident_2d = incident_2d;
    if reference_hull.len() < 3 {
        let incident_hull = graham_scan(&incident_2d, eps);
        if incident_hull.len() >= 3 {
            incident_2d = std::mem::replace(&mut reference_hull, incident_hull);
        } else {
            let ends = |hull: &[Vec2]| -> Option<[Vec3; 2]> {
                let first = plane.lift(*hull.first()?);
                let last = plane.lift(*hull.last()?);
                Some([first, last])
            };
            let (Some(edge_r), Some(edge_i)) = (ends(&reference_hull), ends(&incident_hull))
            else {
                return Err(ManifoldError::EmptyClip);
            };
            return Ok(vec![edge_edge_contact(&edge_r, &edge_i)]);
        }
    }

    let clipped = clip_incident(&incident_2d, &reference_hull, eps);
    if clipped.is_empty() {
        return Err(ManifoldError::EmptyClip);
    }
    Ok(clipped.into_iter().map(|p| plane.lift(p)).collect())
}

fn clip_incident(incident: &[Vec2], reference_hull: &[Vec2], eps: f32) -> Vec<Vec2> {
    match incident {
        [] => Vec::new(),
        [p] => {
            if point_in_convex_polygon(*p, reference_hull, eps) {
                vec![*p]
            } else {
                Vec::new()
            }
        }
        [p0, p1] => clip_segment_to_polygon(*p0, *p1, reference_hull, eps)
            .map(|(a, b)| vec![a, b])
            .unwrap_or_default(),
        _ => {
            let incident_hull = graham_scan(incident, eps);
            if incident_hull.len() < 3 {
                clip_incident(&incident_hull, reference_hull, eps)
            } else {
                sutherland_hodgman(&incident_hull, reference_hull, eps)
            }
        }
    }
}

fn edge_edge_contact(edge_a: &[Vec3], edge_b: &[Vec3]) -> Vec3 {
    let a0 = edge_a[0];
    let a1 = *edge_a.last().unwrap_or(&a0);
    let b0 = edge_b[0];
    let b1 = *edge_b.last().unwrap_or(&b0);
    let (on_a, on_b) = closest_points_between_segments(a0, a1, b0, b1);
    (on_a + on_b) * 0.5
}

fn dedup_points(points: Vec<Vec3>) -> Vec<Vec3> {
    let mut unique: Vec<Vec3> = Vec::with_capacity(points.len());
    for p in points {
        if unique.iter().all(|q| q.distance(p) >= DUPLICATE_DISTANCE) {
            unique.push(p);
        }
    }
    unique
}

fn sorted_by_projection(points: &[Vec3], direction: Vec3) -> Vec<(f32, Vec3)> {
    let mut projected: Vec<(f32, Vec3)> = points.iter().map(|p| (p.dot(direction), *p)).collect();
    // Stable, so equal projections keep input order.
    projected.sort_by(|x, y| y.0.total_cmp(&x.0));
    projected
}

/// The `count` points furthest along `direction`, furthest first.
pub fn extreme_points(points: &[Vec3], direction: Vec3, count: usize) -> Vec<Vec3> {
    sorted_by_projection(points, direction)
        .into_iter()
        .take(count)
        .map(|(_, p)| p)
        .collect()
}

/// Incident feature along `direction`: a face of up to 4 points when the
/// third point is co-planar with the first, otherwise an edge.
pub fn incident_points(points: &[Vec3], direction: Vec3, tolerance: f32) -> Vec<Vec3> {
    let sorted = sorted_by_projection(points, direction);
    let Some((top, _)) = sorted.first().copied() else {
        return Vec::new();
    };

    let is_face = sorted.get(2).is_some_and(|(d, _)| top - d <= tolerance);
    if is_face {
        sorted
            .into_iter()
            .take_while(|(d, _)| top - d <= tolerance)
            .take(MAX_FACE_POINTS)
            .map(|(_, p)| p)
            .collect()
    } else {
        sorted.into_iter().take(2).map(|(_, p)| p).collect()
    }
}

/// Every point within `tolerance` of the extreme projection along `direction`.
pub fn feature_points(points: &[Vec3], direction: Vec3, tolerance: f32) -> Vec<Vec3> {
    let sorted = sorted_by_projection(points, direction);
    let Some((top, _)) = sorted.first().copied() else {
        return Vec::new();
    };
    sorted
        .into_iter()
        .take_while(|(d, _)| top - d <= tolerance)
        .map(|(_, p)| p)
        .collect()
}

/// Tangent basis `(u, v)` of the plane with the given normal. `u` is built
/// from the world axis least aligned with `normal`.
pub fn contact_basis(normal: Vec3) -> (Vec3, Vec3) {
    let a = normal.abs();
    let axis = if a.x <= a.y && a.x <= a.z {
        Vec3::X
    } else if a.y <= a.z {
        Vec3::Y
    } else {
        Vec3::Z
    };
    let u = normal.cross(axis).normalize();
    let v = normal.cross(u);
    (u, v)
}

fn cross(o: Vec2, a: Vec2, b: Vec2) -> f32 {
    (a - o).perp_dot(b - o)
}

/// Convex hull of 2D points, counter-clockwise from the lowest point.
/// Collinear and duplicate points are dropped.
pub fn graham_scan(points: &[Vec2], epsilon: f32) -> Vec<Vec2> {
    let mut unique: Vec<Vec2> = Vec::with_capacity(points.len());
    for p in points {
        if unique.iter().all(|q| q.distance_squared(*p) > epsilon * epsilon) {
            unique.push(*p);
        }
    }
    if unique.len() < 3 {
        return unique;
    }

    let pivot_index = unique
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let pivot = unique.swap_remove(pivot_index);

    unique.sort_by(|a, b| {
        let angle_a = (a.y - pivot.y).atan2(a.x - pivot.x);
        let angle_b = (b.y - pivot.y).atan2(b.x - pivot.x);
        angle_a
            .total_cmp(&angle_b)
            .then(pivot.distance_squared(*a).total_cmp(&pivot.distance_squared(*b)))
    });

    let mut hull: Vec<Vec2> = Vec::with_capacity(unique.len() + 1);
    hull.push(pivot);
    for p in unique {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= epsilon {
            hull.pop();
        }
        hull.push(p);
    }

    // All points on one line.
    if hull.len() == 3 && cross(hull[0], hull[1], hull[2]).abs() <= epsilon {
        hull.remove(1);
    }
    hull
}

/// Whether `p` is inside (or on) a counter-clockwise convex polygon.
pub fn point_in_convex_polygon(p: Vec2, polygon: &[Vec2], epsilon: f32) -> bool {
    let n = polygon.len();
    (0..n).all(|i| cross(polygon[i], polygon[(i + 1) % n], p) >= -epsilon)
}

/// Clips `subject` against a counter-clockwise convex `clip` polygon.
pub fn sutherland_hodgman(subject: &[Vec2], clip: &[Vec2], epsilon: f32) -> Vec<Vec2> {
    let mut output = subject.to_vec();
    let n = clip.len();

    for i in 0..n {
        if output.is_empty() {
            break;
        }
        let edge_start = clip[i];
        let edge_end = clip[(i + 1) % n];
        let inside = |p: Vec2| cross(edge_start, edge_end, p) >= -epsilon;

        let input = std::mem::take(&mut output);
        let mut previous = input[input.len() - 1];
        for current in input {
            let current_inside = inside(current);
            let previous_inside = inside(previous);
            if current_inside {
                if !previous_inside {
                    if let Some(x) = line_intersection(previous, current, edge_start, edge_end) {
                        output.push(x);
                    }
                }
                output.push(current);
            } else if previous_inside {
                if let Some(x) = line_intersection(previous, current, edge_start, edge_end) {
                    output.push(x);
                }
            }
            previous = current;
        }
    }

    output
}

/// Intersection of segment `p0 p1` with the infinite line through `a b`.
fn line_intersection(p0: Vec2, p1: Vec2, a: Vec2, b: Vec2) -> Option<Vec2> {
    let d = p1 - p0;
    let e = b - a;
    let denom = d.perp_dot(e);
    if denom.abs() <= f32::EPSILON {
        return None;
    }
    let t = (a - p0).perp_dot(e) / denom;
    Some(p0 + d * t)
}

/// Cyrus-Beck clip of segment `p0 p1` against a counter-clockwise convex
/// polygon. Returns the surviving sub-segment.
pub fn clip_segment_to_polygon(
    p0: Vec2,
    p1: Vec2,
    polygon: &[Vec2],
    epsilon: f32,
) -> Option<(Vec2, Vec2)> {
    let d = p1 - p0;
    let mut t_enter = 0.0_f32;
    let mut t_exit = 1.0_f32;
    let n = polygon.len();

    for i in 0..n {
        let edge = polygon[(i + 1) % n] - polygon[i];
        let outward = Vec2::new(edge.y, -edge.x);
        let num = outward.dot(p0 - polygon[i]);
        let den = outward.dot(d);

        if den.abs() <= epsilon {
            if num > epsilon {
                return None;
            }
            continue;
        }

        let t = -num / den;
        if den < 0.0 {
            t_enter = t_enter.max(t);
        } else {
            t_exit = t_exit.min(t);
        }
        if t_enter > t_exit {
            return None;
        }
    }

    let start = if t_enter > 0.0 { p0 + d * t_enter } else { p0 };
    let end = if t_exit < 1.0 { p0 + d * t_exit } else { p1 };
    Some((start, end))
}

/// Closest points between segments `p1 q1` and `p2 q2`, clamped to both
/// segments. Degenerate segments are treated as points.
pub fn closest_points_between_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (Vec3, Vec3) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.dot(d1);
    let e = d2.dot(d2);
    let f = d2.dot(r);

    if a <= SEGMENT_EPSILON && e <= SEGMENT_EPSILON {
        return (p1, p2);
    }

    let (s, t) = if a <= SEGMENT_EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= SEGMENT_EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > SEGMENT_EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                // Parallel: any s works, take the start.
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    (p1 + d1 * s, p2 + d2 * t)
}
