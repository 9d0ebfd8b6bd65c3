// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use glam::{Mat3, Vec3};
use slotmap::SecondaryMap;

use crate::{
    config::SolverSettings,
    handles::BodyHandle,
    physics::{
        collider::Material,
        manifold::ContactManifold,
        rigid_body::{RigidBody, RigidBodySet},
    },
};

/// Last step's points further than this from a new point don't seed it.
const WARM_START_DISTANCE: f32 = 0.05;
/// Minimum cosine between last step's normal and the new one for seeding.
const WARM_START_NORMAL_ALIGNMENT: f32 = 0.95;

/// Per-pair coefficients after the combine rules were applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedMaterial {
    pub restitution: f32,
    pub static_friction: f32,
    pub kinetic_friction: f32,
}

impl CombinedMaterial {
    pub fn combine(a: &Material, b: &Material, solver: &SolverSettings) -> Self {
        Self {
            restitution: solver.restitution_rule.combine(a.elasticity, b.elasticity),
            static_friction: solver.friction_rule.combine(a.static_friction, b.static_friction),
            kinetic_friction: solver
                .friction_rule
                .combine(a.kinetic_friction, b.kinetic_friction),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactConstraint {
    pub point: Vec3,
    pub r_a: Vec3,
    pub r_b: Vec3,
    pub normal: Vec3,
    /// Normal relative velocity before any impulse of this step.
    pub initial_normal_velocity: f32,
    /// Normal relative velocity the solver drives towards.
    pub target_normal_velocity: f32,
    pub accumulated_normal: f32,
    pub accumulated_tangent: Vec3,
}

impl ContactConstraint {
    pub fn new(
        a: &RigidBody,
        b: &RigidBody,
        point: Vec3,
        normal: Vec3,
        restitution: f32,
        restitution_threshold: f32,
    ) -> Self {
        let r_a = point - a.position;
        let r_b = point - b.position;
        let vn0 = relative_velocity(a, b, r_a, r_b).dot(normal);
        let target_normal_velocity = if vn0 < -restitution_threshold {
            -restitution * vn0
        } else {
            0.0
        };

        Self {
            point,
            r_a,
            r_b,
            normal,
            initial_normal_velocity: vn0,
            target_normal_velocity,
            accumulated_normal: 0.0,
            accumulated_tangent: Vec3::ZERO,
        }
    }
}

/// Impulses a contact point ended a step with, kept to seed the next step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedImpulse {
    pub point: Vec3,
    pub normal: Vec3,
    pub normal_impulse: f32,
    pub tangent_impulse: Vec3,
}

/// Every contact point of one manifold, solved together with the other
/// manifolds of the step.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifoldConstraint {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Unit normal pointing from A toward B.
    pub normal: Vec3,
    pub depth: f32,
    pub material: CombinedMaterial,
    pub points: Vec<ContactConstraint>,
}

impl ManifoldConstraint {
    /// `None` when either body is missing from `bodies`.
    pub fn new(
        bodies: &RigidBodySet,
        body_a: BodyHandle,
        body_b: BodyHandle,
        manifold: &ContactManifold,
        material: CombinedMaterial,
        solver: &SolverSettings,
    ) -> Option<Self> {
        let a = bodies.get(body_a)?;
        let b = bodies.get(body_b)?;
        let points = manifold
            .points
            .iter()
            .map(|point| {
                ContactConstraint::new(
                    a,
                    b,
                    *point,
                    manifold.normal,
                    material.restitution,
                    solver.restitution_threshold,
                )
            })
            .collect();

        Some(Self {
            body_a,
            body_b,
            normal: manifold.normal,
            depth: manifold.depth,
            material,
            points,
        })
    }

    /// Fastest approach along the normal over all points, before solving.
    pub fn approach_speed(&self) -> f32 {
        self.points
            .iter()
            .map(|point| -point.initial_normal_velocity)
            .fold(0.0, f32::max)
    }

    /// Seeds each point's accumulated impulses from the nearest point of the
    /// previous step, scaled by `factor`.
    pub fn seed(&mut self, previous: &[CachedImpulse], factor: f32) {
        if factor <= 0.0 {
            return;
        }

        for point in &mut self.points {
            let nearest = previous
                .iter()
                .filter(|cached| cached.normal.dot(point.normal) >= WARM_START_NORMAL_ALIGNMENT)
                .map(|cached| (cached.point.distance_squared(point.point), cached))
                .filter(|(distance_squared, _)| {
                    *distance_squared <= WARM_START_DISTANCE * WARM_START_DISTANCE
                })
                .min_by(|x, y| x.0.total_cmp(&y.0));
            let Some((_, cached)) = nearest else {
                continue;
            };

            let n = point.normal;
            let tangent = cached.tangent_impulse - n * cached.tangent_impulse.dot(n);
            point.accumulated_normal = cached.normal_impulse.max(0.0) * factor;
            point.accumulated_tangent = tangent * factor;
        }
    }

    pub fn cached_impulses(&self) -> Vec<CachedImpulse> {
        self.points
            .iter()
            .map(|point| CachedImpulse {
                point: point.point,
                normal: point.normal,
                normal_impulse: point.accumulated_normal,
                tangent_impulse: point.accumulated_tangent,
            })
            .collect()
    }
}

fn relative_velocity(a: &RigidBody, b: &RigidBody, r_a: Vec3, r_b: Vec3) -> Vec3 {
    b.velocity_at(r_b) - a.velocity_at(r_a)
}

/// Effective mass denominator of an impulse along `direction`.
fn effective_mass(a: &RigidBody, b: &RigidBody, r_a: Vec3, r_b: Vec3, direction: Vec3) -> f32 {
    let angular = |inv_inertia: Mat3, r: Vec3| direction.dot((inv_inertia * r.cross(direction)).cross(r));
    a.inverse_mass()
        + b.inverse_mass()
        + angular(a.world_inverse_inertia(), r_a)
        + angular(b.world_inverse_inertia(), r_b)
}

fn apply_pair_impulse(a: &mut RigidBody, b: &mut RigidBody, constraint: &ContactConstraint, impulse: Vec3) {
    a.apply_impulse(-impulse, constraint.r_a);
    b.apply_impulse(impulse, constraint.r_b);
}

/// Applies the seeded impulses of every constraint once, before the first
/// velocity pass.
pub fn warm_start(bodies: &mut RigidBodySet, constraints: &[ManifoldConstraint]) {
    for constraint in constraints {
        let Some([a, b]) = bodies.get_disjoint_mut([constraint.body_a, constraint.body_b]) else {
            continue;
        };
        for point in &constraint.points {
            let impulse = point.normal * point.accumulated_normal + point.accumulated_tangent;
            if impulse != Vec3::ZERO {
                apply_pair_impulse(a, b, point, impulse);
            }
        }
    }
}

/// Sequential impulses with Coulomb friction. Every pass visits the points of
/// all manifolds, so a body touching several partners sees all of them.
pub fn solve_velocities(
    bodies: &mut RigidBodySet,
    constraints: &mut [ManifoldConstraint],
    solver: &SolverSettings,
) {
    for _ in 0..solver.iterations {
        for constraint in constraints.iter_mut() {
            let Some([a, b]) = bodies.get_disjoint_mut([constraint.body_a, constraint.body_b])
            else {
                continue;
            };
            if a.inverse_mass() + b.inverse_mass() <= f32::EPSILON {
                continue;
            }

            let material = constraint.material;
            for point in &mut constraint.points {
                solve_normal(a, b, point);
                solve_friction(a, b, point, &material);
            }
        }
    }
}

fn solve_normal(a: &mut RigidBody, b: &mut RigidBody, constraint: &mut ContactConstraint) {
    let n = constraint.normal;
    let k = effective_mass(a, b, constraint.r_a, constraint.r_b, n);
    if k <= f32::EPSILON {
        return;
    }

    let vn = relative_velocity(a, b, constraint.r_a, constraint.r_b).dot(n);
    let delta = (constraint.target_normal_velocity - vn) / k;
    let accumulated = (constraint.accumulated_normal + delta).max(0.0);
    let applied = accumulated - constraint.accumulated_normal;
    constraint.accumulated_normal = accumulated;

    apply_pair_impulse(a, b, constraint, n * applied);
}

fn solve_friction(
    a: &mut RigidBody,
    b: &mut RigidBody,
    constraint: &mut ContactConstraint,
    material: &CombinedMaterial,
) {
    let n = constraint.normal;
    let rv = relative_velocity(a, b, constraint.r_a, constraint.r_b);
    let vt = rv - n * rv.dot(n);
    let speed = vt.length();
    if speed <= f32::EPSILON {
        return;
    }
    let tangent = vt / speed;

    let k = effective_mass(a, b, constraint.r_a, constraint.r_b, tangent);
    if k <= f32::EPSILON {
        return;
    }

    let candidate = constraint.accumulated_tangent - tangent * (speed / k);
    let lambda_n = constraint.accumulated_normal;
    let accumulated = if candidate.length() <= material.static_friction * lambda_n {
        candidate
    } else {
        candidate.clamp_length_max(material.kinetic_friction * lambda_n)
    };
    let applied = accumulated - constraint.accumulated_tangent;
    constraint.accumulated_tangent = accumulated;

    apply_pair_impulse(a, b, constraint, applied);
}

fn add_offset(offsets: &mut SecondaryMap<BodyHandle, Vec3>, body: BodyHandle, delta: Vec3) {
    if let Some(entry) = offsets.entry(body) {
        *entry.or_insert(Vec3::ZERO) += delta;
    }
}

/// Pushes bodies apart along the manifold normals, split by inverse mass.
///
/// Each manifold aims to remove `max(depth - slop, 0) * position_correction`
/// along its normal. Offsets accumulate over `position_iterations` passes, and
/// a manifold only pushes for the part its bodies' offsets have not covered.
pub fn correct_positions(
    bodies: &mut RigidBodySet,
    constraints: &[ManifoldConstraint],
    solver: &SolverSettings,
) {
    let mut offsets: SecondaryMap<BodyHandle, Vec3> = SecondaryMap::new();

    for _ in 0..solver.position_iterations {
        for constraint in constraints {
            let (Some(a), Some(b)) = (bodies.get(constraint.body_a), bodies.get(constraint.body_b))
            else {
                continue;
            };
            let inverse_mass_sum = a.inverse_mass() + b.inverse_mass();
            if inverse_mass_sum <= f32::EPSILON {
                continue;
            }

            let target = (constraint.depth - solver.penetration_slop).max(0.0) * solver.position_correction;
            let offset_a = offsets.get(constraint.body_a).copied().unwrap_or_default();
            let offset_b = offsets.get(constraint.body_b).copied().unwrap_or_default();
            let resolved = (offset_b - offset_a).dot(constraint.normal);
            let magnitude = target - resolved;
            if magnitude <= 0.0 {
                continue;
            }

            let correction = constraint.normal * (magnitude / inverse_mass_sum);
            let (inverse_mass_a, inverse_mass_b) = (a.inverse_mass(), b.inverse_mass());
            add_offset(&mut offsets, constraint.body_a, -correction * inverse_mass_a);
            add_offset(&mut offsets, constraint.body_b, correction * inverse_mass_b);
        }
    }

    for (handle, offset) in offsets {
        if let Some(body) = bodies.get_mut(handle) {
            if body.is_dynamic() {
                body.position += offset;
            }
        }
    }
}
