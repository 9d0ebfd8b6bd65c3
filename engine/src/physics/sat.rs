// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use glam::Vec3;

use crate::physics::shape::Obb;

/// An edge axis only replaces the best axis when it is smaller by this fraction.
const EDGE_AXIS_RELATIVE_BIAS: f32 = 1e-4;

/// Which candidate axis separated or won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatAxis {
    /// Face normal `i` of the first box.
    FaceA(usize),
    /// Face normal `i` of the second box.
    FaceB(usize),
    /// Cross product of edge `i` of the first box with edge `j` of the second.
    Edge(usize, usize),
}

impl SatAxis {
    pub fn is_edge(&self) -> bool {
        matches!(self, SatAxis::Edge(..))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatContact {
    /// Unit normal pointing from the first box toward the second.
    pub normal: Vec3,
    pub depth: f32,
    pub axis: SatAxis,
}

/// Candidate separating axes: 3 face normals per box, then the 9 edge cross
/// products. Cross products of near-parallel edges are skipped.
pub fn sat_axes(a: &Obb, b: &Obb, epsilon: f32) -> Vec<(SatAxis, Vec3)> {
    let mut axes = Vec::with_capacity(15);
    for (i, axis) in a.axes.iter().enumerate() {
        axes.push((SatAxis::FaceA(i), *axis));
    }
    for (i, axis) in b.axes.iter().enumerate() {
        axes.push((SatAxis::FaceB(i), *axis));
    }
    for (i, edge_a) in a.axes.iter().enumerate() {
        for (j, edge_b) in b.axes.iter().enumerate() {
            let cross = edge_a.cross(*edge_b);
            let length_squared = cross.length_squared();
            if length_squared <= epsilon {
                continue;
            }
            axes.push((SatAxis::Edge(i, j), cross / length_squared.sqrt()));
        }
    }
    axes
}

fn project(vertices: &[Vec3; 8], axis: Vec3) -> (f32, f32) {
    vertices
        .iter()
        .map(|v| v.dot(axis))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), d| {
            (min.min(d), max.max(d))
        })
}

/// Separating axis test between two oriented boxes.
///
/// Returns `None` as soon as one axis separates the projections. Otherwise
/// returns the axis of least overlap, oriented from `a` toward `b`.
pub fn collide_obb_obb(a: &Obb, b: &Obb, epsilon: f32) -> Option<SatContact> {
    let vertices_a = a.vertices();
    let vertices_b = b.vertices();

    let mut best: Option<SatContact> = None;

    for (kind, axis) in sat_axes(a, b, epsilon) {
        let (min_a, max_a) = project(&vertices_a, axis);
        let (min_b, max_b) = project(&vertices_b, axis);

        if max_a < min_b || max_b < min_a {
            return None;
        }

        // Push b along +axis or along -axis, whichever is shorter.
        let forward = max_a - min_b;
        let backward = max_b - min_a;
        let (depth, normal) = if forward <= backward {
            (forward, axis)
        } else {
            (backward, -axis)
        };

        let replace = match &best {
            None => true,
            Some(current) if kind.is_edge() => {
                depth < current.depth * (1.0 - EDGE_AXIS_RELATIVE_BIAS)
            }
            Some(current) => depth < current.depth,
        };
        if replace {
            best = Some(SatContact {
                normal,
                depth,
                axis: kind,
            });
        }
    }

    best
}

/// Decision-only variant: stops at the first separating axis and never
/// computes overlap depth.
pub fn obb_obb_intersects(a: &Obb, b: &Obb, epsilon: f32) -> bool {
    let vertices_a = a.vertices();
    let vertices_b = b.vertices();

    sat_axes(a, b, epsilon).into_iter().all(|(_, axis)| {
        let (min_a, max_a) = project(&vertices_a, axis);
        let (min_b, max_b) = project(&vertices_b, axis);
        !(max_a < min_b || max_b < min_a)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Quat;
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use std::f32::consts::FRAC_PI_4;

    const EPS: f32 = 1e-6;

    fn unit_box(center: Vec3, rotation: Quat) -> Obb {
        Obb::new(center, rotation, Vec3::ONE)
    }

    #[test]
    fn boxes_ten_units_apart_do_not_collide() {
        let a = unit_box(Vec3::ZERO, Quat::IDENTITY);
        let b = unit_box(Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY);
        assert!(collide_obb_obb(&a, &b, EPS).is_none());
        assert!(!obb_obb_intersects(&a, &b, EPS));
    }

    #[test]
    fn identical_boxes_overlap_by_full_dimension() {
        let a = unit_box(Vec3::ZERO, Quat::IDENTITY);
        let contact = collide_obb_obb(&a, &a, EPS).expect("overlapping");
        assert_relative_eq!(contact.depth, 2.0, epsilon = 1e-6);
        assert_eq!(contact.axis, SatAxis::FaceA(0));
        assert!(obb_obb_intersects(&a, &a, EPS));
    }

    #[test]
    fn face_overlap_reports_depth_and_direction() {
        let a = unit_box(Vec3::ZERO, Quat::IDENTITY);
        let b = unit_box(Vec3::new(1.5, 0.2, 0.0), Quat::IDENTITY);
        let contact = collide_obb_obb(&a, &b, EPS).expect("overlapping");
        assert_relative_eq!(contact.depth, 0.5, epsilon = 1e-6);
        assert_relative_eq!(contact.normal.x, 1.0, epsilon = 1e-6);
        assert_eq!(contact.axis, SatAxis::FaceA(0));

        let flipped = collide_obb_obb(&b, &a, EPS).expect("overlapping");
        assert_relative_eq!(flipped.normal.x, -1.0, epsilon = 1e-6);
        assert_eq!(flipped.axis, SatAxis::FaceA(0));
    }

    #[test]
    fn second_box_face_wins_when_it_is_shallowest() {
        let a = unit_box(Vec3::ZERO, Quat::from_rotation_z(FRAC_PI_4));
        let b = Obb::new(Vec3::new(0.0, 2.3, 0.0), Quat::IDENTITY, Vec3::new(3.0, 1.0, 3.0));
        let contact = collide_obb_obb(&a, &b, EPS).expect("overlapping");
        assert_eq!(contact.axis, SatAxis::FaceB(1));
        assert_relative_eq!(contact.depth, std::f32::consts::SQRT_2 + 1.0 - 2.3, epsilon = 1e-5);
        assert_relative_eq!(contact.normal.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn rotated_corner_into_face() {
        let a = unit_box(Vec3::ZERO, Quat::IDENTITY);
        let b = unit_box(Vec3::new(2.2, 0.0, 0.0), Quat::from_rotation_z(FRAC_PI_4));
        let contact = collide_obb_obb(&a, &b, EPS).expect("overlapping");
        assert_eq!(contact.axis, SatAxis::FaceA(0));
        assert_relative_eq!(
            contact.depth,
            1.0 + std::f32::consts::SQRT_2 - 2.2,
            epsilon = 1e-5
        );
    }

    #[test]
    fn crossed_edges_pick_edge_axis() {
        let r = std::f32::consts::SQRT_2;
        let a = unit_box(Vec3::ZERO, Quat::from_rotation_z(FRAC_PI_4));
        let b = unit_box(
            Vec3::new(2.0 * r - 0.1, 0.0, 0.0),
            Quat::from_rotation_y(FRAC_PI_4),
        );
        let contact = collide_obb_obb(&a, &b, EPS).expect("overlapping");
        assert_eq!(contact.axis, SatAxis::Edge(2, 1));
        assert_relative_eq!(contact.depth, 0.1, epsilon = 1e-4);
        assert_relative_eq!(contact.normal.x.abs(), 1.0, epsilon = 1e-5);
        assert!(contact.normal.x > 0.0);
    }

    #[test]
    fn parallel_boxes_skip_degenerate_cross_axes() {
        let a = unit_box(Vec3::ZERO, Quat::IDENTITY);
        let axes = sat_axes(&a, &a, EPS);
        // Parallel edge pairs vanish; the other six repeat face normals.
        assert_eq!(axes.len(), 6 + 6);
        assert!(axes.iter().all(|(_, axis)| (axis.length() - 1.0).abs() < 1e-5));
    }

    #[test]
    fn decision_agrees_with_full_test() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let a = Obb::new(
                Vec3::new(
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                ),
                Quat::from_euler(
                    glam::EulerRot::XYZ,
                    rng.random_range(-3.0..3.0),
                    rng.random_range(-3.0..3.0),
                    rng.random_range(-3.0..3.0),
                ),
                Vec3::new(
                    rng.random_range(0.2..1.5),
                    rng.random_range(0.2..1.5),
                    rng.random_range(0.2..1.5),
                ),
            );
            let b = Obb::new(
                Vec3::new(
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                ),
                Quat::from_rotation_y(rng.random_range(-3.0..3.0)),
                Vec3::splat(rng.random_range(0.2..1.5)),
            );
            assert_eq!(
                collide_obb_obb(&a, &b, EPS).is_some(),
                obb_obb_intersects(&a, &b, EPS)
            );
        }
    }
}
