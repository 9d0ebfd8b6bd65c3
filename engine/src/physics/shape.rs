// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::{error::PhysicsError, physics::aabb::Aabb};

const MIN_HULL_POINTS: usize = 3;
const COINCIDENT_EPSILON: f32 = 1e-12;

/// Collision geometry in body-local, unscaled space.
#[derive(Debug, Clone, PartialEq)]
pub enum ColliderShape {
    /// Oriented box. Orientation and scale come from the owning body.
    Cuboid { half_extents: Vec3 },
    /// Arbitrary convex point set. Triangles, when given, are used for the inertia integral.
    ConvexHull {
        points: Vec<Vec3>,
        triangles: Option<Vec<[u32; 3]>>,
    },
}

impl ColliderShape {
    pub fn cuboid(half_extents: Vec3) -> Self {
        ColliderShape::Cuboid { half_extents }
    }

    /// The [-1, 1] cube; body scale then acts as half extents.
    pub fn unit_cube() -> Self {
        ColliderShape::Cuboid {
            half_extents: Vec3::ONE,
        }
    }

    pub fn convex_hull(points: Vec<Vec3>) -> Self {
        ColliderShape::ConvexHull {
            points,
            triangles: None,
        }
    }

    pub fn convex_mesh(points: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        ColliderShape::ConvexHull {
            points,
            triangles: Some(triangles),
        }
    }

    pub fn is_cuboid(&self) -> bool {
        matches!(self, ColliderShape::Cuboid { .. })
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        match self {
            ColliderShape::Cuboid { half_extents } => {
                if !half_extents.is_finite() || half_extents.min_element() <= 0.0 {
                    return Err(PhysicsError::InvalidHalfExtents(*half_extents));
                }
            }
            ColliderShape::ConvexHull { points, triangles } => {
                if points.len() < MIN_HULL_POINTS {
                    return Err(PhysicsError::TooFewPoints {
                        required: MIN_HULL_POINTS,
                        actual: points.len(),
                    });
                }
                if let Some((index, point)) =
                    points.iter().enumerate().find(|(_, p)| !p.is_finite())
                {
                    return Err(PhysicsError::NonFinitePoint {
                        index,
                        point: *point,
                    });
                }
                let first = points[0];
                if points
                    .iter()
                    .all(|p| p.distance_squared(first) <= COINCIDENT_EPSILON)
                {
                    return Err(PhysicsError::DegenerateShape);
                }
                if let Some(triangles) = triangles {
                    for (triangle, indices) in triangles.iter().enumerate() {
                        if let Some(index) = indices.iter().find(|i| **i as usize >= points.len())
                        {
                            return Err(PhysicsError::TriangleIndexOutOfRange {
                                triangle,
                                index: *index as usize,
                                len: points.len(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Vertices in local space. Cuboids yield their 8 corners.
    pub fn local_points(&self) -> Vec<Vec3> {
        match self {
            ColliderShape::Cuboid { half_extents } => {
                Aabb::new(-*half_extents, *half_extents).corners().to_vec()
            }
            ColliderShape::ConvexHull { points, .. } => points.clone(),
        }
    }

    pub fn local_aabb(&self) -> Aabb {
        match self {
            ColliderShape::Cuboid { half_extents } => Aabb::new(-*half_extents, *half_extents),
            ColliderShape::ConvexHull { points, .. } => {
                Aabb::from_points(points).unwrap_or_default()
            }
        }
    }

    /// Triangle mesh of the shape, if one is known.
    pub fn triangle_mesh(&self) -> Option<(Vec<Vec3>, Vec<[u32; 3]>)> {
        match self {
            ColliderShape::Cuboid { half_extents } => Some(box_mesh(*half_extents)),
            ColliderShape::ConvexHull {
                points,
                triangles: Some(triangles),
            } => Some((points.clone(), triangles.clone())),
            ColliderShape::ConvexHull { .. } => None,
        }
    }
}

/// Point of `points` furthest along `direction`. The first one wins ties.
pub fn furthest_point(points: &[Vec3], direction: Vec3) -> Vec3 {
    let mut best = Vec3::ZERO;
    let mut best_dot = f32::NEG_INFINITY;
    for p in points {
        let d = p.dot(direction);
        if d > best_dot {
            best_dot = d;
            best = *p;
        }
    }
    best
}

pub fn centroid(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return Vec3::ZERO;
    }
    points.iter().copied().sum::<Vec3>() / points.len() as f32
}

/// Oriented box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obb {
    pub center: Vec3,
    pub axes: [Vec3; 3],
    pub half_extents: Vec3,
}

impl Obb {
    pub fn new(center: Vec3, rotation: Quat, half_extents: Vec3) -> Self {
        let basis = Mat3::from_quat(rotation);
        Self {
            center,
            axes: [basis.x_axis, basis.y_axis, basis.z_axis],
            half_extents: half_extents.abs(),
        }
    }

    /// Box around `local` bounds once placed by `position`, `rotation` and `scale`.
    pub fn from_local_aabb(local: &Aabb, position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        let center = position + rotation * (local.center() * scale);
        Self::new(center, rotation, local.half_extents() * scale)
    }

    /// Corners, indexed so that bit 0 picks +x, bit 1 +y and bit 2 +z.
    pub fn vertices(&self) -> [Vec3; 8] {
        let [ax, ay, az] = self.axes;
        let h = self.half_extents;
        std::array::from_fn(|i| {
            let sx = if i & 1 != 0 { 1.0 } else { -1.0 };
            let sy = if i & 2 != 0 { 1.0 } else { -1.0 };
            let sz = if i & 4 != 0 { 1.0 } else { -1.0 };
            self.center + ax * (sx * h.x) + ay * (sy * h.y) + az * (sz * h.z)
        })
    }
}

/// Outward-wound triangle mesh of a box centred at the origin.
pub fn box_mesh(half_extents: Vec3) -> (Vec<Vec3>, Vec<[u32; 3]>) {
    let vertices = Aabb::new(-half_extents, half_extents).corners().to_vec();
    let triangles = vec![
        [0, 4, 6],
        [0, 6, 2],
        [1, 3, 7],
        [1, 7, 5],
        [0, 1, 5],
        [0, 5, 4],
        [2, 6, 7],
        [2, 7, 3],
        [0, 2, 3],
        [0, 3, 1],
        [4, 5, 7],
        [4, 7, 6],
    ];
    (vertices, triangles)
}

/// Places local points in the world: scale, then rotate, then translate.
pub fn transform_points(points: &[Vec3], transform: &Mat4) -> Vec<Vec3> {
    points
        .iter()
        .map(|p| transform.transform_point3(*p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn hull_with_two_points_is_rejected() {
        let shape = ColliderShape::convex_hull(vec![Vec3::ZERO, Vec3::X]);
        assert_eq!(
            shape.validate(),
            Err(PhysicsError::TooFewPoints {
                required: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn hull_with_nan_point_is_rejected() {
        let shape = ColliderShape::convex_hull(vec![
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(f32::NAN, 0.0, 0.0),
        ]);
        assert!(matches!(
            shape.validate(),
            Err(PhysicsError::NonFinitePoint { index: 2, .. })
        ));
    }

    #[test]
    fn coincident_hull_is_rejected() {
        let shape = ColliderShape::convex_hull(vec![Vec3::ONE; 5]);
        assert_eq!(shape.validate(), Err(PhysicsError::DegenerateShape));
    }

    #[test]
    fn triangle_out_of_range_is_rejected() {
        let shape = ColliderShape::convex_mesh(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
            vec![[0, 1, 4]],
        );
        assert!(matches!(
            shape.validate(),
            Err(PhysicsError::TriangleIndexOutOfRange { index: 4, .. })
        ));
    }

    #[test]
    fn flat_box_is_rejected() {
        let shape = ColliderShape::cuboid(Vec3::new(1.0, 0.0, 1.0));
        assert!(matches!(
            shape.validate(),
            Err(PhysicsError::InvalidHalfExtents(_))
        ));
    }

    #[test]
    fn furthest_point_prefers_first_on_ties() {
        let points = [Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0)];
        assert_eq!(furthest_point(&points, Vec3::X), points[0]);
        assert_eq!(furthest_point(&points, Vec3::Y), points[1]);
    }

    #[test]
    fn obb_vertices_follow_rotation() {
        let obb = Obb::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(2.0, 1.0, 1.0),
        );
        let vertices = obb.vertices();
        // Local +x now points along world +y.
        let top = vertices
            .iter()
            .map(|v| v.y)
            .fold(f32::NEG_INFINITY, f32::max);
        assert_relative_eq!(top, 4.0, epsilon = 1e-5);
        let right = vertices
            .iter()
            .map(|v| v.x)
            .fold(f32::NEG_INFINITY, f32::max);
        assert_relative_eq!(right, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn box_mesh_triangles_face_outward() {
        let (vertices, triangles) = box_mesh(Vec3::new(1.0, 2.0, 3.0));
        for [a, b, c] in triangles {
            let (a, b, c) = (
                vertices[a as usize],
                vertices[b as usize],
                vertices[c as usize],
            );
            let normal = (b - a).cross(c - a);
            let centre = (a + b + c) / 3.0;
            assert!(normal.dot(centre) > 0.0);
        }
    }
}
