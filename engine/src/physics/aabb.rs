// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use glam::{Mat4, Vec3};

/// Axis-aligned bounding box. `min` is the bottom-left corner, `max` the top-right one.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Smallest box around `points`, or `None` when there are none.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (min, max) = rest
            .iter()
            .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Surface area, the cost metric of the tree's insertion heuristic.
    pub fn surface_area(&self) -> f32 {
        let d = (self.max - self.min).max(Vec3::ZERO);
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Overlap test that tolerates gaps up to `slack` on every axis.
    pub fn intersects(&self, other: &Aabb, slack: f32) -> bool {
        !(self.max.x + slack < other.min.x
            || self.min.x - slack > other.max.x
            || self.max.y + slack < other.min.y
            || self.min.y - slack > other.max.y
            || self.max.z + slack < other.min.z
            || self.min.z - slack > other.max.z)
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    pub fn expanded(&self, margin: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (min, max) = (self.min, self.max);
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ]
    }

    /// Bounds of this box after an affine transform, through its 8 corners.
    pub fn transformed(&self, transform: &Mat4) -> Aabb {
        let corners = self.corners().map(|c| transform.transform_point3(c));
        let mut out = Aabb {
            min: corners[0],
            max: corners[0],
        };
        for c in &corners[1..] {
            out.min = out.min.min(*c);
            out.max = out.max.max(*c);
        }
        out
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Quat;

    #[test]
    fn from_points_bounds_all_points() {
        let points = [
            Vec3::new(1.0, -2.0, 3.0),
            Vec3::new(-4.0, 5.0, 0.0),
            Vec3::new(7.0, 8.0, -6.0),
        ];
        let aabb = Aabb::from_points(&points).expect("non-empty");
        assert_eq!(aabb.min, Vec3::new(-4.0, -2.0, -6.0));
        assert_eq!(aabb.max, Vec3::new(7.0, 8.0, 3.0));
        assert!(Aabb::from_points(&[]).is_none());
    }

    #[test]
    fn surface_area_of_unit_cube_and_flat_box() {
        let cube = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_relative_eq!(cube.surface_area(), 6.0);

        let flat = Aabb::new(Vec3::ZERO, Vec3::new(2.0, 0.0, 3.0));
        assert_relative_eq!(flat.surface_area(), 12.0);
    }

    #[test]
    fn intersects_respects_slack() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::new(1.05, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(!a.intersects(&b, 0.0));
        assert!(a.intersects(&b, 0.1));
        assert!(b.intersects(&a, 0.1));
    }

    #[test]
    fn touching_boxes_intersect() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(a.intersects(&b, 0.0));
    }

    #[test]
    fn contains_and_union() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(0.25), Vec3::splat(0.75));
        assert!(a.contains(&b));
        assert!(!b.contains(&a));

        let c = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        let u = a.union(&c);
        assert!(u.contains(&a) && u.contains(&c));
        assert_eq!(u.min, Vec3::ZERO);
        assert_eq!(u.max, Vec3::splat(3.0));
    }

    #[test]
    fn transformed_rotated_box_grows() {
        let unit = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let transform = Mat4::from_rotation_translation(
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_4),
            Vec3::new(5.0, 0.0, 0.0),
        );
        let out = unit.transformed(&transform);
        let r = std::f32::consts::SQRT_2;
        assert_relative_eq!(out.min.x, 5.0 - r, epsilon = 1e-5);
        assert_relative_eq!(out.max.x, 5.0 + r, epsilon = 1e-5);
        assert_relative_eq!(out.max.y, r, epsilon = 1e-5);
        assert_relative_eq!(out.max.z, 1.0, epsilon = 1e-5);
    }
}
